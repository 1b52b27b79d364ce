//! Error handling for pipeline assembly and runtime
//!
//! Construction failures are surfaced synchronously to whoever calls the graph
//! builder; runtime failures travel through the stop signal in
//! [`crate::lifecycle`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the headcount pipeline
#[derive(Error, Debug)]
pub enum HeadcountError {
    // Command line
    #[error("Invalid argument: {0}")]
    Argument(String),

    // Capability probe
    #[error("GPU device query unavailable: {0}")]
    DeviceQueryUnavailable(String),

    // Graph construction
    #[error("Could not create '{name}' ({factory}): {reason}")]
    ElementCreation {
        name: String,
        factory: String,
        reason: String,
    },

    #[error("Elements could not be linked: {upstream} -> {downstream}: {reason}")]
    Link {
        upstream: String,
        downstream: String,
        reason: String,
    },

    #[error("Topology is invalid: {0}")]
    InvalidTopology(String),

    // Runtime
    #[error("ERROR from element {source_element}: {message}")]
    RuntimeFatal {
        source_element: String,
        message: String,
    },

    #[error("Pipeline state change failed: {0}")]
    StateChange(String),

    // Configuration
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Configuration parsing failed: {0}")]
    ConfigParse(String),

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidConfigValue { field: String, value: String },

    // Platform
    #[error("Not supported by this build: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type alias for convenience
pub type HeadcountResult<T> = std::result::Result<T, HeadcountError>;

impl HeadcountError {
    /// Construction errors abort the build and unwind created nodes.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            HeadcountError::ElementCreation { .. }
                | HeadcountError::Link { .. }
                | HeadcountError::InvalidTopology(_)
        )
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            HeadcountError::Argument(_) => 2,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for HeadcountError {
    fn from(err: std::io::Error) -> Self {
        HeadcountError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for HeadcountError {
    fn from(err: toml::de::Error) -> Self {
        HeadcountError::ConfigParse(err.to_string())
    }
}

impl From<serde_yaml::Error> for HeadcountError {
    fn from(err: serde_yaml::Error) -> Self {
        HeadcountError::ConfigParse(err.to_string())
    }
}

impl From<serde_json::Error> for HeadcountError {
    fn from(err: serde_json::Error) -> Self {
        HeadcountError::ConfigParse(err.to_string())
    }
}

#[cfg(feature = "gst")]
impl From<glib::Error> for HeadcountError {
    fn from(err: glib::Error) -> Self {
        HeadcountError::Unsupported(format!("GStreamer initialisation failed: {}", err))
    }
}

#[cfg(feature = "gst")]
impl From<glib::BoolError> for HeadcountError {
    fn from(err: glib::BoolError) -> Self {
        HeadcountError::StateChange(err.to_string())
    }
}

/// Error context builder for adding additional information
pub struct ErrorContext {
    base_error: HeadcountError,
    context: Vec<String>,
}

impl ErrorContext {
    pub fn new(error: HeadcountError) -> Self {
        Self {
            base_error: error,
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context.push(context.to_string());
        self
    }

    /// Collapse the context chain into the error. Construction errors keep
    /// their variant so callers can still tell them apart.
    pub fn build(self) -> HeadcountError {
        if self.context.is_empty() {
            return self.base_error;
        }
        let prefix = self.context.join(" -> ");
        match self.base_error {
            HeadcountError::ConfigParse(msg) => {
                HeadcountError::ConfigParse(format!("{}: {}", prefix, msg))
            }
            HeadcountError::Io(msg) => HeadcountError::Io(format!("{}: {}", prefix, msg)),
            other => other,
        }
    }
}

/// Convenience macro for adding context to errors
#[macro_export]
macro_rules! headcount_context {
    ($result:expr, $context:expr) => {
        $result.map_err(|e| {
            $crate::error::ErrorContext::new(e.into())
                .with_context($context)
                .build()
        })
    };
}
