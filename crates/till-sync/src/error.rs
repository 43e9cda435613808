//! # Sync Error Types
//!
//! Error types for the cache, the remote source contract and configuration.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Remote        │  │     Write path          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  RemoteError    │  │  WriteRejected          │ │
//! │  │  ConfigLoad     │  │  (kind-tagged,  │  │  (surfaced verbatim)    │ │
//! │  │  ConfigSave     │  │   transient →   │  │  InvalidDocument        │ │
//! │  │                 │  │   stale data)   │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Nothing here is fatal: the worst outcome of a remote failure is that  │
//! │  consumers keep reading the last snapshot with `is_stale = true`.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use thiserror::Error;
use till_core::CoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Remote Errors
// =============================================================================

/// Error tag reported by the remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// Security rules refused the read or write.
    PermissionDenied,
    /// Backend unreachable; the source will retry on its own.
    Unavailable,
    /// Referenced document or collection does not exist.
    NotFound,
    /// Malformed query or write.
    InvalidArgument,
    /// Anything else.
    Internal,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteErrorKind::PermissionDenied => write!(f, "permission-denied"),
            RemoteErrorKind::Unavailable => write!(f, "unavailable"),
            RemoteErrorKind::NotFound => write!(f, "not-found"),
            RemoteErrorKind::InvalidArgument => write!(f, "invalid-argument"),
            RemoteErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// A kind-tagged error from the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        RemoteError {
            kind,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::PermissionDenied, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unavailable, message)
    }

    /// Network hiccups that clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, RemoteErrorKind::Unavailable | RemoteErrorKind::Internal)
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Sync error type covering cache, write-path and configuration failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid cache configuration.
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The remote source reported an error.
    #[error("Remote source error: {0}")]
    Remote(#[from] RemoteError),

    /// The remote store refused a write. Shown to the user as-is.
    #[error("Write rejected: {0}")]
    WriteRejected(RemoteError),

    // =========================================================================
    // Data Errors
    // =========================================================================
    /// A document could not be encoded or decoded.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Domain validation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// No tokio runtime to drive subscription tasks.
    #[error("No async runtime available to drive subscriptions")]
    NoRuntime,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidDocument(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the failure is expected to clear without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) | SyncError::WriteRejected(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Remote(RemoteError::unavailable("offline")).is_retryable());
        assert!(!SyncError::Remote(RemoteError::permission_denied("rules")).is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::NoRuntime.is_retryable());
    }

    #[test]
    fn test_remote_error_display_carries_kind() {
        let err = RemoteError::permission_denied("missing role");
        assert_eq!(err.to_string(), "permission-denied: missing role");

        let err = SyncError::WriteRejected(err);
        assert_eq!(err.to_string(), "Write rejected: permission-denied: missing role");
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::ConfigSaveFailed("disk".into()).is_config_error());
    }
}
