//! Error types for tokscope operations.
//!
//! [`TokscopeError`] covers the failures that are allowed to reach a caller:
//! directory-level I/O, configuration problems and internal bugs. Per-line and
//! per-file parse failures never surface here; readers log and skip them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`TokscopeError`].
pub type Result<T> = std::result::Result<T, TokscopeError>;

/// Error type for tokscope operations.
#[derive(Debug, Error)]
pub enum TokscopeError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file is not valid YAML for the expected schema
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration parsed but a value is out of range
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Parsing Errors
    // =========================================================================
    /// JSON parsing error
    #[error("JSON parse error in {context}: {message}")]
    JsonParse {
        context: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in tokscope)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TokscopeError {
    /// Create a ConfigInvalid error
    pub fn config_invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a ConfigValidation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a JSON parse error
    pub fn json_parse(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::JsonParse {
            context: context.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigInvalid { .. } | Self::ConfigValidation { .. })
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => {
                Some("Check YAML syntax in ~/.tokscope/config.yaml or pass --config")
            }
            Self::ConfigValidation { .. } => {
                Some("Fix the reported value or remove it to use the default")
            }
            Self::DirectoryCreation { .. } => Some("Check permissions on ~/.tokscope/"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_invalid_error() {
        let err = TokscopeError::config_invalid("/home/user/.tokscope/config.yaml", "bad indent");
        assert!(err.to_string().contains("Invalid configuration"));
        assert!(err.to_string().contains("bad indent"));
        assert!(err.is_config_error());
        assert!(err.guidance().is_some());
    }

    #[test]
    fn test_json_parse_keeps_source() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = TokscopeError::json_parse("history.jsonl", source);
        assert!(err.to_string().starts_with("JSON parse error in history.jsonl"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_internal_has_no_guidance() {
        assert_eq!(TokscopeError::internal("bug").guidance(), None);
    }
}
