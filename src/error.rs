use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReldocError {
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Cannot resolve reference '{reference}' of type {type_name}")]
    ReferenceResolution { reference: String, type_name: String },
    #[error("Unknown field '{field}' on {type_name}")]
    UnknownField { field: String, type_name: String },
    #[error("Unknown type: {0}")]
    UnknownType(String),
    #[error("Unsupported operation on {type_name}: {reason}")]
    UnsupportedOperation { type_name: String, reason: String },
    #[error("Duplicate reference '{reference}' for type {type_name}")]
    Duplicate { reference: String, type_name: String },
    #[error("Store error: {0}")]
    Store(String),
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ReldocError>;

// Helper conversions
impl From<rusqlite::Error> for ReldocError {
    fn from(e: rusqlite::Error) -> Self { Self::Store(e.to_string()) }
}
impl From<config::ConfigError> for ReldocError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl<T> From<std::sync::PoisonError<T>> for ReldocError {
    fn from(e: std::sync::PoisonError<T>) -> Self { Self::Store(format!("lock poisoned: {e}")) }
}
