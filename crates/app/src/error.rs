use catalog::CatalogError;
use streaming::FetchError;

#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// The startup config could not be fetched or has the wrong shape.
    Config { url: String, message: String },
    Catalog(CatalogError),
    InvalidStartData(String),
    InvalidUrl(String),
    Share { id: String, message: String },
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Config { url, message } => write!(f, "config {url}: {message}"),
            AppError::Catalog(e) => write!(f, "{e}"),
            AppError::InvalidStartData(msg) => write!(f, "invalid start data: {msg}"),
            AppError::InvalidUrl(url) => write!(f, "invalid url: {url}"),
            AppError::Share { id, message } => {
                write!(f, "could not resolve share `{id}`: {message}")
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Catalog(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(e: CatalogError) -> Self {
        AppError::Catalog(e)
    }
}

impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        AppError::Catalog(CatalogError::Fetch(e))
    }
}
