use thiserror::Error;

/// Top-level error type for the Cartwise client.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for CartwiseError` so that `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CartwiseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Audio error: {0}")]
    Audio(String),
}

impl From<toml::de::Error> for CartwiseError {
    fn from(err: toml::de::Error) -> Self {
        CartwiseError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CartwiseError {
    fn from(err: toml::ser::Error) -> Self {
        CartwiseError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CartwiseError {
    fn from(err: serde_json::Error) -> Self {
        CartwiseError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Cartwise operations.
pub type Result<T> = std::result::Result<T, CartwiseError>;
