//! Application state: startup, init data, the URL hash, the workbench and
//! viewer state, built on the [`catalog`] crate.

pub mod application;
pub mod config;
pub mod cors;
pub mod error;
mod init_data;
pub mod picked;
pub mod share;
pub mod state;
pub mod url_hash;
pub mod viewer;
pub mod workbench;

pub use application::*;
pub use config::*;
pub use cors::*;
pub use error::*;
pub use picked::*;
pub use share::*;
pub use state::*;
pub use url_hash::*;
pub use viewer::*;
pub use workbench::*;
