pub mod cache;
pub mod fetch;
pub mod init_source;
pub mod resolver;

pub use cache::*;
pub use fetch::*;
pub use init_source::*;
pub use resolver::*;

/// JSON object as produced by `serde_json`.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;
