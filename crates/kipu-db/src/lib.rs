//! # kipu-db: Database Layer for Kipu
//!
//! SQLite persistence for the submission pipeline.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     kipu-db Responsibilities                            │
//! │                                                                         │
//! │  kipu-sunat ──► documents()  ──► state-gated submission updates        │
//! │  kipu-billing ► pool()       ──► transactional ledger writes           │
//! │  seeding/ops ─► tenants(), payments()                                  │
//! │                                                                         │
//! │  One SqlitePool, WAL mode, embedded migrations.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use kipu_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./kipu.db")).await?;
//! let doc = db.documents().get_by_id("...").await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::document::{DocumentRepository, SubmissionArtifacts};
pub use repository::payment::PaymentRepository;
pub use repository::tenant::TenantRepository;

// =============================================================================
// Test Fixtures
// =============================================================================
