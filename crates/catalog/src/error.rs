use foundation::ModelId;
use layers::TableError;
use streaming::FetchError;

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// A model without a unique id cannot be registered.
    InvalidModel(String),
    DuplicateModel(ModelId),
    InvalidTraits { id: ModelId, message: String },
    CannotDereference(ModelId),
    UnknownType { id: ModelId, type_name: Option<String> },
    NotFound(ModelId),
    Fetch(FetchError),
    Table { id: ModelId, source: TableError },
    StorageUnavailable,
    Corrupt(String),
    Io(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::InvalidModel(msg) => write!(f, "invalid model: {msg}"),
            CatalogError::DuplicateModel(id) => {
                write!(f, "a model with the id `{id}` already exists")
            }
            CatalogError::InvalidTraits { id, message } => {
                write!(f, "invalid traits for model `{id}`: {message}")
            }
            CatalogError::CannotDereference(id) => write!(
                f,
                "model `{id}` has a `dereferenced` block but cannot be dereferenced"
            ),
            CatalogError::UnknownType { id, type_name: Some(t) } => {
                write!(f, "model `{id}` has unknown type `{t}`")
            }
            CatalogError::UnknownType { id, type_name: None } => {
                write!(f, "model `{id}` does not have a type")
            }
            CatalogError::NotFound(id) => write!(f, "model not found: {id}"),
            CatalogError::Fetch(e) => write!(f, "{e}"),
            CatalogError::Table { id, source } => write!(f, "model `{id}`: {source}"),
            CatalogError::StorageUnavailable => write!(f, "browser storage unavailable"),
            CatalogError::Corrupt(msg) => write!(f, "storage corrupt: {msg}"),
            CatalogError::Io(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Fetch(e) => Some(e),
            CatalogError::Table { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<FetchError> for CatalogError {
    fn from(e: FetchError) -> Self {
        CatalogError::Fetch(e)
    }
}
