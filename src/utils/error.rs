//! Error Handling Module
//!
//! Defines the error type shared by the advisory core.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for advisory operations
#[derive(Error, Debug)]
pub enum AdvisorError {
    /// Error decoding or validating an uploaded image
    #[error("Image error: {0}")]
    Image(String),

    /// Error loading a model artifact
    #[error("Failed to load model at '{0}': {1}")]
    ModelLoad(PathBuf, String),

    /// Error raised by an inference backend while predicting
    #[error("Inference error: {0}")]
    Inference(String),

    /// A model load did not finish in time
    #[error("Timed out after {seconds}s loading {what}")]
    LoadTimeout { what: String, seconds: u64 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for AdvisorError {
    fn from(err: serde_json::Error) -> Self {
        AdvisorError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for AdvisorError {
    fn from(err: image::ImageError) -> Self {
        AdvisorError::Image(err.to_string())
    }
}

/// Convenience Result type for advisory operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| AdvisorError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| AdvisorError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AdvisorError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| AdvisorError::InvalidInput(f()))
    }
}
