//! # Submission State Machine
//!
//! The single source of truth for how a document moves through the SUNAT
//! submission lifecycle.
//!
//! ## State Diagram
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Submission Lifecycle                                 │
//! │                                                                         │
//! │                 TransportAccepted                                      │
//! │   ┌─────────┐ ──────────────────────► ┌───────────┐    Accepted        │
//! │   │ PENDING │                         │ SUBMITTED │ ─────────► ACCEPTED│
//! │   └─────────┘ ─────┐                  └───────────┘                    │
//! │                    │ TransportFailed    │       │ ▲      Rejected      │
//! │                    ▼                    │       └─┘ ────────► REJECTED │
//! │   ┌───────────────┐  TransportAccepted │   StillPending               │
//! │   │ SUBMIT_FAILED │ ────────────────────┘   (no-op loop)              │
//! │   └───────────────┘                                                    │
//! │        │    ▲                                                          │
//! │        └────┘ TransportFailed (retry also failed)                      │
//! │                                                                         │
//! │   ACCEPTED / REJECTED are terminal: every outcome applied to them      │
//! │   is an error, never a silent overwrite.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why One Function
//! The manual submit path, the periodic poll job and the retry job all drive
//! the same documents. Each consults [`next_state`] and persists the result
//! behind a state-gated UPDATE, so no caller can invent a transition the
//! table below doesn't allow.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Submission State
// =============================================================================

/// Per-document submission lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    /// Created locally, never sent.
    Pending,
    /// Accepted by the gateway transport; awaiting the tax authority's
    /// decision. Carries a correlation id.
    Submitted,
    /// Tax authority accepted the document. Terminal.
    Accepted,
    /// Tax authority rejected the document. Terminal — a rejection is a
    /// decision, not a transient failure, and requires a new document.
    Rejected,
    /// Transport/protocol failure before reaching a decision. Retryable.
    SubmitFailed,
}

impl SubmissionState {
    /// True once the tax authority has decided; terminal states never change.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Accepted | SubmissionState::Rejected)
    }

    /// True if the (re)submit path may pick this document up.
    ///
    /// `Submitted` is deliberately excluded: a document the gateway already
    /// holds is re-polled, never re-sent.
    pub const fn is_retry_eligible(&self) -> bool {
        matches!(self, SubmissionState::Pending | SubmissionState::SubmitFailed)
    }

    /// Persisted snake_case representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Pending => "pending",
            SubmissionState::Submitted => "submitted",
            SubmissionState::Accepted => "accepted",
            SubmissionState::Rejected => "rejected",
            SubmissionState::SubmitFailed => "submit_failed",
        }
    }
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Submission Outcome
// =============================================================================

/// What actually happened during one interaction with the gateway.
///
/// Transport outcomes and tax-authority decisions are distinct events:
/// a submit that reaches the gateway is `TransportAccepted` even if the
/// decision arrives in the very same HTTP exchange — the caller then applies
/// the decision as a second outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The gateway took the document and returned a correlation id.
    TransportAccepted,
    /// Network/protocol failure before the gateway held the document.
    TransportFailed,
    /// Tax authority accepted.
    Accepted,
    /// Tax authority rejected.
    Rejected,
    /// Tax authority has not decided yet.
    StillPending,
}

// =============================================================================
// Transition Errors
// =============================================================================

/// A transition the state machine does not allow.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// Outcome applied to a terminal state.
    #[error("document is already {state}, no further transitions allowed")]
    Terminal { state: SubmissionState },

    /// Outcome makes no sense for the current state (e.g. a decision for a
    /// document that was never submitted).
    #[error("outcome {outcome:?} is not valid from state {from}")]
    InvalidTransition {
        from: SubmissionState,
        outcome: SubmissionOutcome,
    },
}

// =============================================================================
// Transition Function
// =============================================================================

/// Computes the successor state for `current` given `outcome`.
///
/// This is the ONLY way submission state advances. The full table:
///
/// | from          | outcome           | to            |
/// |---------------|-------------------|---------------|
/// | Pending       | TransportAccepted | Submitted     |
/// | Pending       | TransportFailed   | SubmitFailed  |
/// | SubmitFailed  | TransportAccepted | Submitted     |
/// | SubmitFailed  | TransportFailed   | SubmitFailed  |
/// | Submitted     | Accepted          | Accepted      |
/// | Submitted     | Rejected          | Rejected      |
/// | Submitted     | StillPending      | Submitted     |
///
/// Everything else is an error. In particular `Submitted` rejects
/// `TransportAccepted` — that is the at-most-once guard against a second
/// in-flight submission of the same document.
pub fn next_state(
    current: SubmissionState,
    outcome: SubmissionOutcome,
) -> Result<SubmissionState, StateError> {
    use SubmissionOutcome::*;
    use SubmissionState::*;

    if current.is_terminal() {
        return Err(StateError::Terminal { state: current });
    }

    match (current, outcome) {
        (Pending | SubmitFailed, TransportAccepted) => Ok(Submitted),
        (Pending | SubmitFailed, TransportFailed) => Ok(SubmitFailed),
        (Submitted, SubmissionOutcome::Accepted) => Ok(SubmissionState::Accepted),
        (Submitted, SubmissionOutcome::Rejected) => Ok(SubmissionState::Rejected),
        (Submitted, StillPending) => Ok(Submitted),
        (from, outcome) => Err(StateError::InvalidTransition { from, outcome }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
