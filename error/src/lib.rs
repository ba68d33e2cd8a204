//! Error types shared by the shim crates.
//!
//! Errors fall in two classes. Configuration and stream errors are fatal:
//! they stop the shim before collection starts, or terminate the run loop.
//! Collection and encoding errors are reported and the shim keeps going.

use thiserror::Error;

/// Errors that can occur while loading, registering or running a plugin
#[derive(Debug, Error)]
pub enum ShimError {
    /// Invalid or missing configuration, unknown plugin, unresolved secret,
    /// or a plugin that refused to initialize or start
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A single collection operation failed
    #[error("collection error in plugin '{plugin}': {message}")]
    Collection { plugin: String, message: String },

    /// A single metric could not be serialized
    #[error("cannot encode metric '{metric}': {reason}")]
    Encoding { metric: String, reason: String },

    /// The output stream became unwritable or the input stream failed
    #[error("stream error: {message}")]
    Stream { message: String },

    /// I/O error while reading or writing one of the streams
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShimError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ShimError::Configuration {
            message: message.into(),
        }
    }

    pub fn collection(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        ShimError::Collection {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn encoding(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        ShimError::Encoding {
            metric: metric.into(),
            reason: reason.into(),
        }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        ShimError::Stream {
            message: message.into(),
        }
    }

    /// Whether this error must terminate the shim.
    pub fn is_fatal(&self) -> bool {
        match self {
            ShimError::Configuration { .. } | ShimError::Stream { .. } | ShimError::Io(_) => true,
            ShimError::Collection { .. } | ShimError::Encoding { .. } => false,
        }
    }
}

/// A specialized Result type for shim operations
pub type Result<T> = std::result::Result<T, ShimError>;
