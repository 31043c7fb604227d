//! # Error Types
//!
//! Domain-specific error types for kipu-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kipu-core errors (this file)                                          │
//! │  ├── CoreError        - General domain errors                          │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── StateError       - Illegal submission transitions (submission.rs) │
//! │                                                                         │
//! │  kipu-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  kipu-sunat errors (separate crate)                                    │
//! │  └── SunatError       - Gateway transport/protocol, rejection, retry   │
//! │                                                                         │
//! │  kipu-billing errors (separate crate)                                  │
//! │  └── BillingError     - Ledger failures (overdraw, voided, missing)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (series, field, id)
//! 3. Errors are enum variants, never String
//! 4. Validation failures surface synchronously and are never retried

use thiserror::Error;

use crate::submission::StateError;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Illegal submission state transition.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// A stored JSON column failed to deserialize (shipment block).
    #[error("Malformed stored JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when a document or payment doesn't meet requirements.
/// Used for early validation before any I/O runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., RUC with wrong length, bad series).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Amount would overdraw the document's outstanding balance.
    #[error("amount {attempted} exceeds outstanding balance {balance}")]
    ExceedsBalance { attempted: String, balance: String },
}

impl ValidationError {
    /// Creates a Required error for the given field.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
