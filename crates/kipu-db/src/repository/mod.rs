//! # Repository Module
//!
//! Repositories encapsulate all SQL for one aggregate each:
//!
//! - [`document::DocumentRepository`] - fiscal documents, lines, and the
//!   state-gated submission updates
//! - [`payment::PaymentRepository`] - payment reads
//! - [`tenant::TenantRepository`] - tenants and gateway credentials
//!
//! Repositories are cheap to construct (they clone the pool handle); the
//! [`crate::Database`] accessors build them on demand.

pub mod document;
pub mod payment;
pub mod tenant;
