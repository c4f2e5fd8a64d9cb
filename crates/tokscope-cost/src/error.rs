//! Error types for the cost module.
//!
//! Only the remote refresh path produces these. Price lookups never fail:
//! an unknown model falls back to a family or default tier.

use thiserror::Error;

/// Cost and pricing errors.
#[derive(Error, Debug)]
pub enum CostError {
    /// HTTP client or transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate table endpoint answered with a non-success status
    #[error("rate table request to {url} failed with status {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Fetch exceeded its time budget
    #[error("rate table fetch timed out after {secs}s")]
    Timeout {
        /// Budget in seconds
        secs: u64,
    },

    /// Page fetched but no recognizable rate rows found
    #[error("no pricing rows found at {url}")]
    EmptyTable {
        /// Requested URL
        url: String,
    },

    /// JSON parsing error (pricing cache file)
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (pricing cache file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CostError {
    /// True when retrying later might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CostError::Timeout { .. } => true,
            CostError::Status { status, .. } => *status >= 500 || *status == 429,
            CostError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Result type for cost operations.
pub type Result<T> = std::result::Result<T, CostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let err = CostError::Status {
            status: 503,
            url: "https://example.test".into(),
        };
        assert!(err.is_transient());
        assert!(err.to_string().contains("503"));

        let err = CostError::Status {
            status: 404,
            url: "https://example.test".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_empty_table_not_transient() {
        let err = CostError::EmptyTable {
            url: "https://example.test".into(),
        };
        assert!(!err.is_transient());
    }
}
