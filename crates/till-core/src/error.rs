//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core errors (this file)                                          │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Structural rule / settings failures            │
//! │                                                                         │
//! │  till-sync errors (separate crate)                                     │
//! │  ├── SyncError        - Cache, config and write-path failures          │
//! │  └── RemoteError      - Tagged errors reported by the remote source    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → Frontend              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `ValidationError` raised while resolving discounts is never fatal: the
//! offending rule is excluded and resolution continues (see
//! [`crate::discount::Resolution::excluded`]).

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found in the catalog.
    ///
    /// ## When This Occurs
    /// - Product ID doesn't exist in the inventory mirror
    /// - Inventory mirror hasn't received its first snapshot yet
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// A discount rule failed structural validation.
    #[error("Invalid discount rule {rule_id}: {source}")]
    InvalidRule {
        rule_id: String,
        #[source]
        source: ValidationError,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used both at write time (before a rule is sent to the remote store) and
/// at read time (mirrored rules are re-checked before resolution).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: String,
        min: String,
        max: String,
    },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustBeNonNegative { field: String },

    /// Activation window ends before it starts.
    #[error("activeUntil must not be earlier than activeFrom")]
    InvalidWindow,

    /// Invalid format (e.g., malformed URL).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
