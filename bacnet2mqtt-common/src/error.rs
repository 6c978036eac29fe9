use thiserror::Error;

/// Common error type for bacnet2mqtt components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid topic: {0}")]
    Topic(String),
}

/// Result type alias using bacnet2mqtt's Error.
pub type Result<T> = std::result::Result<T, Error>;
