//! Error types for RFQScope.
//!
//! Library crates use [`RfqScopeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::{RunId, StageFailure};

/// Top-level error type for all RFQScope operations.
#[derive(Debug, thiserror::Error)]
pub enum RfqScopeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A document could not be read or parsed.
    #[error("load error at {path:?}: {message}")]
    Load { path: PathBuf, message: String },

    /// The external text-generation service failed (network, timeout, quota, bad response).
    #[error("generation error: {0}")]
    Generation(String),

    /// Parsing of generated or stored content failed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or cache layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad run id, out-of-range rating, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// One or more pipeline stages failed; completed artifacts remain on disk.
    #[error("run {run_id}: {} stage(s) failed: {}", failures.len(), join_failures(failures))]
    Pipeline {
        run_id: RunId,
        failures: Vec<StageFailure>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RfqScopeError>;

impl RfqScopeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a generation error from any displayable message.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Create a load error for a document path.
    pub fn load(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn join_failures(failures: &[StageFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, Stage};

    #[test]
    fn error_display_formatting() {
        let err = RfqScopeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = RfqScopeError::validation("rating 7 outside 1..=5");
        assert!(err.to_string().contains("rating 7"));
    }

    #[test]
    fn pipeline_error_lists_every_failure() {
        let run_id: RunId = "run-42".parse().expect("run id");
        let err = RfqScopeError::Pipeline {
            run_id,
            failures: vec![
                StageFailure::new(Stage::Summary, Role::Customer.to_string(), "timeout"),
                StageFailure::new(Stage::Comparison, "vendor:provider2", "HTTP 500"),
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("run run-42: 2 stage(s) failed"));
        assert!(text.contains("summary stage failed for customer: timeout"));
        assert!(text.contains("comparison stage failed for vendor:provider2: HTTP 500"));
    }

    #[test]
    fn io_error_keeps_source() {
        let err = RfqScopeError::io(
            "/runs/run-42/finalResponse.md",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        );
        assert!(err.to_string().contains("finalResponse.md"));
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "read-only");
    }
}
