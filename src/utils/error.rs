//! Error Handling Module
//!
//! Defines the error type for the domain adaptation library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for domain adaptation operations
#[derive(Error, Debug)]
pub enum DaError {
    /// Invalid experiment configuration (class partition, hyperparameters)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed line in a dataset list file
    #[error("{}:{line}: {message}", path.display())]
    ListFile {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// A weight or loss became NaN/Inf
    #[error("Numeric error: {0}")]
    Numeric(String),

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),

    /// Saving or restoring a checkpoint failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for DaError {
    fn from(err: serde_json::Error) -> Self {
        DaError::Serialization(err.to_string())
    }
}

/// Convenience Result type
pub type Result<T> = std::result::Result<T, DaError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| DaError::Dataset(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| DaError::Dataset(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| DaError::Dataset(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| DaError::Dataset(f()))
    }
}

/// Fail with a `Numeric` error if `value` is NaN or infinite
pub fn ensure_finite(value: f64, what: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DaError::Numeric(format!("{} is not finite ({})", what, value)))
    }
}
