//! Error types for the SafeWay environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Preference store read/write failed
    #[error("Store error: {0}")]
    StoreError(String),

    /// Notification delivery failed
    #[error("Sink error: {0}")]
    SinkError(String),

    /// The location source was shut down
    #[error("Location source closed")]
    SourceClosed,

    /// Stored value could not be encoded/decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EnvError {
    /// Creates a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    /// Creates a sink error.
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::SinkError(msg.into())
    }
}
