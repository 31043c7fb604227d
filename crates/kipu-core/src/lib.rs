//! # kipu-core: Pure Business Logic for Kipu
//!
//! This crate is the **heart** of the Kipu submission pipeline. It contains
//! all business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kipu Architecture                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               Billing layer / internal service calls            │   │
//! │  │        submit_document, register_payment, reconcile, ...        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kipu-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │submission │  │    ubl    │  │   │
//! │  │   │ Document  │  │   Money   │  │  states + │  │  payload  │  │   │
//! │  │   │  Tenant   │  │ céntimos  │  │transitions│  │  builder  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kipu-db (Database Layer)                     │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (FiscalDocument, Tenant, Payment, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`submission`] - Submission state machine and THE transition function
//! - [`ubl`] - Gateway payload builder (UBL 2.1 JSON)
//! - [`validation`] - Identity-field validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in céntimos (i64)
//! 4. **One Transition Function**: Every submission path consults
//!    [`submission::next_state`]; nothing mutates state ad hoc

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod submission;
pub mod types;
pub mod ubl;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use kipu_core::Money` instead of
// `use kipu_core::money::Money`

pub use error::{CoreError, ValidationError};
pub use money::Money;
pub use submission::{next_state, StateError, SubmissionOutcome, SubmissionState};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Standard IGV (Peruvian VAT) rate in basis points: 18%.
///
/// Rate changes are legislation-level events; when one lands this becomes a
/// tenant-level setting. Until then a constant keeps every caller honest.
pub const IGV_RATE_BPS: u32 = 1800;

/// Default currency for documents that don't state one.
pub const DEFAULT_CURRENCY: &str = "PEN";
