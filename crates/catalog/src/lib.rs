//! Catalog models and the machinery that loads them.
//!
//! Models keep their traits in layered strata ([`strata`]), live in a
//! [`registry::ModelRegistry`] shared through a [`context::CatalogContext`],
//! and are created or updated from init document JSON ([`factory`],
//! [`group`], [`loader`]). References resolve to target models
//! ([`reference`]) and CSV items produce styled tables ([`table`]).

pub mod context;
pub mod error;
pub mod factory;
pub mod group;
pub mod json;
pub mod loader;
pub mod model;
pub mod reference;
pub mod registry;
pub mod settings;
pub mod strata;
pub mod table;

pub use context::*;
pub use error::*;
pub use factory::*;
pub use group::*;
pub use loader::*;
pub use model::*;
pub use reference::*;
pub use registry::*;
pub use settings::*;
pub use strata::*;
pub use table::*;
