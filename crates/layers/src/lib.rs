//! Tabular classification: columns, bins, enums, regions, time and legends.
//!
//! Everything here is synchronous and free of I/O. Fetching CSV text and
//! region id tables is the catalog's job.

pub mod binning;
pub mod column;
pub mod error;
pub mod legend;
pub mod region;
pub mod symbology;
pub mod table_style;
pub mod time;

pub use binning::*;
pub use column::*;
pub use error::*;
pub use legend::*;
pub use region::*;
pub use symbology::*;
pub use table_style::*;
pub use time::*;
