//! # Submission Error Types
//!
//! Error taxonomy for the gateway exchange and the submission pipeline.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Submission Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Synchronous    │  │   Retryable     │  │     Terminal            │ │
//! │  │  (caller bug)   │  │  (scheduler)    │  │  (operator action)      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  Transport      │  │  Rejected               │ │
//! │  │  InvalidState   │  │  Protocol       │  │                         │ │
//! │  │  MissingCreds   │  │                 │  │                         │ │
//! │  │  NotFound       │  │                 │  │                         │ │
//! │  │  Voided         │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  The Transport/Protocol vs Rejected split drives WHICH retry path      │
//! │  the state machine takes: the former go to SUBMIT_FAILED and get       │
//! │  rescheduled, the latter is a tax-authority decision and is final.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use kipu_core::{StateError, SubmissionState, ValidationError};
use kipu_db::DbError;

/// Result type alias for submission operations.
pub type SunatResult<T> = Result<T, SunatError>;

/// Submission pipeline errors.
#[derive(Debug, Error)]
pub enum SunatError {
    // =========================================================================
    // Configuration
    // =========================================================================
    /// Invalid service configuration.
    #[error("Invalid sunat configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Synchronous Caller Errors
    // =========================================================================
    /// Malformed document input (missing identity fields, empty lines).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The document is not in a state that allows the requested operation.
    #[error("document {document_id} is {state}, cannot perform operation")]
    InvalidState {
        document_id: String,
        state: SubmissionState,
    },

    /// Illegal state transition (should not happen if callers gate on
    /// `is_retry_eligible`; kept as a hard stop).
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// The tenant has no gateway credentials configured.
    #[error("tenant {tenant_id} has no gateway credentials (provider id/token)")]
    MissingCredentials { tenant_id: String },

    /// Document or tenant not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Document is annulled; it can neither be submitted nor paid.
    #[error("document {document_id} is voided")]
    Voided { document_id: String },

    // =========================================================================
    // Gateway Errors
    // =========================================================================
    /// Network/HTTP failure reaching the gateway. Retry-eligible.
    #[error("Gateway transport error: {0}")]
    Transport(String),

    /// The gateway answered but the response is missing expected correlation
    /// data (no `documentId`). Treated like a transport failure for retry
    /// purposes.
    #[error("Gateway protocol error: {0}")]
    Protocol(String),

    /// The tax authority explicitly rejected the document. Terminal; the
    /// operator corrects the data and issues a NEW document.
    #[error("Rejected by tax authority: {reason}")]
    Rejected { reason: String },

    // =========================================================================
    // Infrastructure
    // =========================================================================
    /// Database failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// JSON (de)serialization failure.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for SunatError {
    fn from(err: reqwest::Error) -> Self {
        SunatError::Transport(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SunatError {
    /// Returns true if this error is a transport-class failure: the document
    /// never reached a decision and a scheduled retry makes sense.
    ///
    /// ## Retryable
    /// - Transport (network/HTTP failures)
    /// - Protocol (malformed gateway response)
    ///
    /// ## Not Retryable
    /// - Rejected (a decision, not a failure)
    /// - Validation / InvalidState / MissingCredentials (caller must fix)
    pub fn is_retryable(&self) -> bool {
        matches!(self, SunatError::Transport(_) | SunatError::Protocol(_))
    }
}
