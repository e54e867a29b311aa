//! Error types for aiko

use thiserror::Error;

/// The main error type for aiko core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// An event bus subscriber failed while handling an event
    #[error("Subscriber error: {0}")]
    Subscriber(String),

    /// Decision engine state errors
    #[error("Bandit error: {0}")]
    Bandit(String),
}

/// A specialized Result type for aiko core operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
