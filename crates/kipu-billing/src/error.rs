//! # Billing Error Types
//!
//! Ledger failures, surfaced synchronously to the caller. Nothing here is
//! retried by machinery — a rejected payment is the caller's problem to fix.

use thiserror::Error;

use kipu_core::ValidationError;
use kipu_db::DbError;

/// Result type alias for ledger operations.
pub type BillingResult<T> = Result<T, BillingError>;

/// Payment ledger errors.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Document or payment not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The document is annulled; no payment can be registered against it.
    #[error("document {document_id} is voided, payments are not allowed")]
    Voided { document_id: String },

    /// Invalid payment input (non-positive amount, overdraw attempt).
    /// The balance is left untouched.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Database failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl BillingError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        BillingError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = BillingError::not_found("Payment", "p-1");
        assert_eq!(err.to_string(), "Payment not found: p-1");

        let err = BillingError::Voided {
            document_id: "d-1".into(),
        };
        assert!(err.to_string().contains("voided"));
    }
}
