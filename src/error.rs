//! Store Error Handling
//!
//! Typed errors for every call made against the remote store, plus a coarse
//! categorization used when logging failures.

use thiserror::Error;

/// Result alias for remote store calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a remote store call
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never produced a response (DNS, connect, timeout, TLS)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    /// No row matched the primary key
    #[error("no row with id {id}")]
    NotFound { id: i64 },

    /// The response body could not be decoded into rows
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Failure reported by a store that is not HTTP-backed
    #[error("{0}")]
    Remote(String),

    /// The change-notification channel could not be opened
    #[error("realtime channel error: {0}")]
    Realtime(String),
}

/// Categorized error types for log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection-level failure
    Network,

    /// The service rejected the request
    Remote,

    /// The addressed row does not exist
    NotFound,

    /// The payload did not match the row shape
    Decode,

    /// Bad credentials or endpoint configuration
    Configuration,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Remote => "remote",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Decode => "decode",
            ErrorCategory::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StoreError {
    /// Categorize this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            StoreError::Transport(_) | StoreError::Realtime(_) => ErrorCategory::Network,
            StoreError::Http { status, .. } if *status == 401 || *status == 403 => {
                ErrorCategory::Configuration
            }
            StoreError::Http { .. } | StoreError::Remote(_) => ErrorCategory::Remote,
            StoreError::NotFound { .. } => ErrorCategory::NotFound,
            StoreError::Decode(_) => ErrorCategory::Decode,
        }
    }
}
