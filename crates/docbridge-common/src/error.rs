//! Error types for docbridge

use thiserror::Error;

/// Result type alias for docbridge operations
pub type Result<T> = std::result::Result<T, DocBridgeError>;

/// Unified error type for all docbridge operations
#[derive(Error, Debug, Clone)]
pub enum DocBridgeError {
    #[error("MongoDB error: {0}")]
    MongoDB(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// A required setting is missing or still holds its "unset" sentinel
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl DocBridgeError {
    /// The underlying message without the category prefix
    pub fn message(&self) -> &str {
        match self {
            DocBridgeError::MongoDB(message)
            | DocBridgeError::Connection(message)
            | DocBridgeError::Configuration(message)
            | DocBridgeError::Validation(message)
            | DocBridgeError::Serialization(message)
            | DocBridgeError::Deserialization(message) => message,
        }
    }
}

impl From<serde_json::Error> for DocBridgeError {
    fn from(err: serde_json::Error) -> Self {
        DocBridgeError::Serialization(err.to_string())
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for DocBridgeError {
    fn from(err: mongodb::error::Error) -> Self {
        DocBridgeError::MongoDB(err.to_string())
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for DocBridgeError {
    fn from(err: bson::ser::Error) -> Self {
        DocBridgeError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for DocBridgeError {
    fn from(err: bson::de::Error) -> Self {
        DocBridgeError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::extjson::de::Error> for DocBridgeError {
    fn from(err: bson::extjson::de::Error) -> Self {
        DocBridgeError::Deserialization(format!("Extended JSON error: {}", err))
    }
}
