#[derive(Debug, Clone, PartialEq)]
pub enum TableError {
    Csv { message: String },
    MissingColumn { name: String },
    InvalidStyle { message: String },
    InvalidRegionMapping { message: String },
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::Csv { message } => write!(f, "csv error: {message}"),
            TableError::MissingColumn { name } => write!(f, "column not found: {name}"),
            TableError::InvalidStyle { message } => write!(f, "invalid table style: {message}"),
            TableError::InvalidRegionMapping { message } => {
                write!(f, "invalid region mapping: {message}")
            }
        }
    }
}

impl std::error::Error for TableError {}

impl From<csv::Error> for TableError {
    fn from(e: csv::Error) -> Self {
        TableError::Csv {
            message: e.to_string(),
        }
    }
}
