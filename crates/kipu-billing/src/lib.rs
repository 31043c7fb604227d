//! # kipu-billing: Payment Ledger
//!
//! Money movement against fiscal-document balances.
//!
//! ## Surface
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       PaymentLedger                                     │
//! │                                                                         │
//! │  register_payment(id, NewPayment)  ─► PaymentReceipt                   │
//! │  reverse_payment(payment_id)       ─► DocumentBalance                  │
//! │  reconcile_balance(id)             ─► ReconcileSummary (idempotent)    │
//! │  reconcile_tenant(tenant_id)       ─► Vec<ReconcileSummary>            │
//! │  list_payments(id)                 ─► PaymentListing                   │
//! │  void_document(id)                 ─► ()                               │
//! │                                                                         │
//! │  Every mutation is one SQLite transaction; the payment-sum invariant   │
//! │  (sum ≤ net payable) holds at every commit point.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod ledger;

pub use error::{BillingError, BillingResult};
pub use ledger::{
    DocumentBalance, NewPayment, PaymentLedger, PaymentListing, PaymentReceipt, ReconcileSummary,
};
