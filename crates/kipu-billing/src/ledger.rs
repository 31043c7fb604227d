//! # Payment Ledger
//!
//! Mutates a document's financial state safely under concurrent partial
//! payments.
//!
//! ## Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   sum(payments on document) ≤ net_payable(document)   AT ALL TIMES     │
//! │                                                                         │
//! │   net_payable = total − detraction (floored at zero)                   │
//! │                                                                         │
//! │   Enforced on every write:                                             │
//! │   • register: validated against the balance read in the SAME           │
//! │     transaction, AND re-checked by the atomic guarded decrement        │
//! │     (WHERE balance_cents >= amount) so a racing registration can       │
//! │     never push the sum past the net payable                            │
//! │   • reverse: deletion + restore in one transaction                     │
//! │   • reconcile: replays payments oldest-first against the recomputed    │
//! │     net figure and deletes any payment that would overdraw it          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All monetary arithmetic is integer céntimos ([`Money`]); "balance is
//! zero" means exactly zero, never a float tolerance.

use chrono::Utc;
use serde::Serialize;
use sqlx::{Sqlite, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use kipu_core::{Money, Payment, PaymentForm, PaymentMethod, PaymentStatus, ValidationError};
use kipu_db::Database;

use crate::error::{BillingError, BillingResult};

const PAYMENT_COLUMNS: &str = "\
    id, document_id, tenant_id, amount_cents, method, reference, note, \
    paid_at, created_at";

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// A payment to register.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: Money,
    pub method: PaymentMethod,
    /// External reference (operation number, voucher id).
    pub reference: Option<String>,
    pub note: Option<String>,
}

impl NewPayment {
    /// Cash payment with no reference, the common case at the counter.
    pub fn cash(amount: Money) -> Self {
        NewPayment {
            amount,
            method: PaymentMethod::Cash,
            reference: None,
            note: None,
        }
    }
}

/// The document's financial position after a ledger operation.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentBalance {
    pub document_id: String,
    pub balance: Money,
    pub status: PaymentStatus,
}

/// Result of a successful registration.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub balance: Money,
    pub status: PaymentStatus,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileSummary {
    pub document_id: String,
    pub net_payable: Money,
    pub total_paid_valid: Money,
    pub balance: Money,
    pub status: PaymentStatus,
    /// Payments removed because they would overdraw the recomputed net.
    pub deleted_payment_ids: Vec<String>,
}

/// Payment history plus totals, for the billing surface.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentListing {
    pub document_id: String,
    pub payments: Vec<Payment>,
    pub total_paid: Money,
    pub balance: Money,
    pub status: PaymentStatus,
}

/// The financial slice of a document row the ledger works with.
#[derive(Debug, Clone, sqlx::FromRow)]
struct DocumentFinancials {
    id: String,
    tenant_id: String,
    total_cents: i64,
    detraction_cents: i64,
    balance_cents: i64,
    payment_form: PaymentForm,
    payment_status: PaymentStatus,
    voided: bool,
}

impl DocumentFinancials {
    fn net_payable(&self) -> Money {
        Money::from_cents(self.total_cents)
            .saturating_sub_floor(Money::from_cents(self.detraction_cents))
    }
}

// =============================================================================
// Payment Ledger
// =============================================================================

/// Transactional ledger over the shared database.
#[derive(Debug, Clone)]
pub struct PaymentLedger {
    db: Database,
}

impl PaymentLedger {
    /// Creates a ledger over the given database.
    pub fn new(db: Database) -> Self {
        PaymentLedger { db }
    }

    // =========================================================================
    // Register
    // =========================================================================

    /// Registers a payment against a document's outstanding balance.
    ///
    /// ## Failure Modes (balance untouched in all of them)
    /// - `NotFound` - no such document
    /// - `Voided` - document is annulled
    /// - `Validation` - amount ≤ 0, or amount exceeds the current balance
    ///
    /// ## Status Rule
    /// `Completed` when the balance reaches exactly zero, `Partial`
    /// otherwise — so the first payment moves `Pending` to
    /// `Partial`/`Completed`, never silently skipped.
    pub async fn register_payment(
        &self,
        document_id: &str,
        new_payment: NewPayment,
    ) -> BillingResult<PaymentReceipt> {
        let mut tx = self.db.pool().begin().await?;

        let mut doc = fetch_financials(&mut tx, document_id)
            .await?
            .ok_or_else(|| BillingError::not_found("FiscalDocument", document_id))?;

        if doc.voided {
            return Err(BillingError::Voided {
                document_id: doc.id,
            });
        }

        // Credit documents stored with a zero balance despite a positive
        // total (and no payments yet) are a known bad legacy shape: restore
        // the net payable before validating, so the payment isn't bounced
        // off a phantom zero.
        if doc.payment_form == PaymentForm::Credito
            && doc.balance_cents == 0
            && doc.total_cents > 0
        {
            let existing: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE document_id = ?1")
                    .bind(&doc.id)
                    .fetch_one(&mut *tx)
                    .await?;

            if existing == 0 {
                let net = doc.net_payable();
                sqlx::query(
                    r#"
                    UPDATE fiscal_documents SET
                        balance_cents = ?2,
                        payment_status = 'pending',
                        updated_at = ?3
                    WHERE id = ?1
                    "#,
                )
                .bind(&doc.id)
                .bind(net.cents())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;

                info!(document_id = %doc.id, balance = %net, "Restored credit balance before payment");
                doc.balance_cents = net.cents();
                doc.payment_status = PaymentStatus::Pending;
            }
        }

        let amount = new_payment.amount;
        if !amount.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "amount".into(),
            }
            .into());
        }

        let balance = Money::from_cents(doc.balance_cents);
        if amount > balance {
            return Err(ValidationError::ExceedsBalance {
                attempted: amount.to_string(),
                balance: balance.to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            document_id: doc.id.clone(),
            tenant_id: doc.tenant_id.clone(),
            amount_cents: amount.cents(),
            method: new_payment.method,
            reference: new_payment.reference,
            note: new_payment.note,
            paid_at: now,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, document_id, tenant_id, amount_cents, method,
                reference, note, paid_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.document_id)
        .bind(&payment.tenant_id)
        .bind(payment.amount_cents)
        .bind(payment.method)
        .bind(&payment.reference)
        .bind(&payment.note)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await?;

        // Guarded decrement: even if another registration slipped between
        // our read and this write, the balance can never go negative.
        let result = sqlx::query(
            r#"
            UPDATE fiscal_documents SET
                balance_cents = balance_cents - ?2,
                payment_status = CASE
                    WHEN balance_cents - ?2 <= 0 THEN 'completed'
                    ELSE 'partial'
                END,
                updated_at = ?3
            WHERE id = ?1 AND balance_cents >= ?2
            "#,
        )
        .bind(&doc.id)
        .bind(amount.cents())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Racing registration consumed the balance first; roll back.
            return Err(ValidationError::ExceedsBalance {
                attempted: amount.to_string(),
                balance: balance.to_string(),
            }
            .into());
        }

        tx.commit().await?;

        let balance_after = balance - amount;
        let status = if balance_after.is_zero() {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Partial
        };

        info!(
            document_id = %doc.id,
            amount = %amount,
            balance = %balance_after,
            status = ?status,
            "Payment registered"
        );

        Ok(PaymentReceipt {
            payment,
            balance: balance_after,
            status,
        })
    }

    // =========================================================================
    // Reverse
    // =========================================================================

    /// Deletes a payment and restores the document balance.
    ///
    /// If this reopens a `Completed` document it reverts to `Partial`.
    pub async fn reverse_payment(&self, payment_id: &str) -> BillingResult<DocumentBalance> {
        let mut tx = self.db.pool().begin().await?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"
        ))
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| BillingError::not_found("Payment", payment_id))?;

        let doc = fetch_financials(&mut tx, &payment.document_id)
            .await?
            .ok_or_else(|| BillingError::not_found("FiscalDocument", &payment.document_id))?;

        sqlx::query("DELETE FROM payments WHERE id = ?1")
            .bind(payment_id)
            .execute(&mut *tx)
            .await?;

        let balance = Money::from_cents(doc.balance_cents) + payment.amount();
        let status = if doc.payment_status == PaymentStatus::Completed && balance.is_positive() {
            PaymentStatus::Partial
        } else {
            doc.payment_status
        };

        sqlx::query(
            r#"
            UPDATE fiscal_documents SET
                balance_cents = ?2,
                payment_status = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(&doc.id)
        .bind(balance.cents())
        .bind(status)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            payment_id = %payment_id,
            document_id = %doc.id,
            restored = %payment.amount(),
            balance = %balance,
            "Payment reversed"
        );

        Ok(DocumentBalance {
            document_id: doc.id,
            balance,
            status,
        })
    }

    // =========================================================================
    // Reconcile
    // =========================================================================

    /// Repairs a document whose stored balance drifted from its payments.
    ///
    /// Recomputes the net payable, replays payments oldest-first against it,
    /// deletes any payment that would overdraw the recomputed figure, and
    /// stores the resulting balance and status.
    ///
    /// Idempotent: a second run finds the already-pruned payment set and
    /// produces the identical balance and status.
    pub async fn reconcile_balance(&self, document_id: &str) -> BillingResult<ReconcileSummary> {
        let mut tx = self.db.pool().begin().await?;

        let doc = fetch_financials(&mut tx, document_id)
            .await?
            .ok_or_else(|| BillingError::not_found("FiscalDocument", document_id))?;

        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE document_id = ?1
            ORDER BY paid_at ASC, created_at ASC
            "#
        ))
        .bind(&doc.id)
        .fetch_all(&mut *tx)
        .await?;

        let net = doc.net_payable();
        let mut remaining = net;
        let mut deleted_payment_ids = Vec::new();

        for payment in &payments {
            if payment.amount() <= remaining {
                remaining -= payment.amount();
            } else {
                // Would overdraw the recomputed net; this payment should
                // never have existed.
                deleted_payment_ids.push(payment.id.clone());
            }
        }

        for id in &deleted_payment_ids {
            sqlx::query("DELETE FROM payments WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let total_paid_valid = net - remaining;
        let status = if remaining.is_zero() {
            PaymentStatus::Completed
        } else if total_paid_valid.is_positive() {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Pending
        };

        sqlx::query(
            r#"
            UPDATE fiscal_documents SET
                balance_cents = ?2,
                payment_status = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(&doc.id)
        .bind(remaining.cents())
        .bind(status)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if !deleted_payment_ids.is_empty() {
            warn!(
                document_id = %doc.id,
                deleted = deleted_payment_ids.len(),
                "Removed overdrawing payments during reconciliation"
            );
        }

        Ok(ReconcileSummary {
            document_id: doc.id,
            net_payable: net,
            total_paid_valid,
            balance: remaining,
            status,
            deleted_payment_ids,
        })
    }

    /// Reconciles every credit document of a tenant. Per-document failures
    /// are logged and skipped so one bad row never blocks the sweep.
    pub async fn reconcile_tenant(&self, tenant_id: &str) -> BillingResult<Vec<ReconcileSummary>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM fiscal_documents
            WHERE tenant_id = ?1 AND payment_form = 'credito'
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut summaries = Vec::new();
        for id in ids {
            match self.reconcile_balance(&id).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    warn!(document_id = %id, error = %e, "Reconciliation failed, continuing");
                }
            }
        }

        Ok(summaries)
    }

    // =========================================================================
    // Reads / Annulment
    // =========================================================================

    /// Payment history with totals, newest first.
    pub async fn list_payments(&self, document_id: &str) -> BillingResult<PaymentListing> {
        let doc = self
            .db
            .documents()
            .get_by_id(document_id)
            .await?
            .ok_or_else(|| BillingError::not_found("FiscalDocument", document_id))?;

        let payments = self.db.payments().list_for_document(document_id).await?;
        let total_paid = Money::from_cents(self.db.payments().total_paid(document_id).await?);

        let balance = doc.balance();
        let status = doc.payment_status;
        Ok(PaymentListing {
            document_id: doc.id,
            payments,
            total_paid,
            balance,
            status,
        })
    }

    /// Operator annulment. A voided document refuses any further payments.
    pub async fn void_document(&self, document_id: &str) -> BillingResult<()> {
        self.db.documents().mark_voided(document_id).await?;
        info!(document_id = %document_id, "Document voided");
        Ok(())
    }
}

/// Loads the financial slice of a document inside the current transaction.
async fn fetch_financials(
    tx: &mut Transaction<'_, Sqlite>,
    document_id: &str,
) -> BillingResult<Option<DocumentFinancials>> {
    let doc = sqlx::query_as::<_, DocumentFinancials>(
        r#"
        SELECT id, tenant_id, total_cents, detraction_cents, balance_cents,
               payment_form, payment_status, voided
        FROM fiscal_documents
        WHERE id = ?1
        "#,
    )
    .bind(document_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(doc)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use kipu_core::{
        CustomerDocType, DocumentType, FiscalDocument, SubmissionState, Tenant,
    };
    use kipu_db::DbConfig;

    fn tenant() -> Tenant {
        Tenant {
            id: Uuid::new_v4().to_string(),
            business_name: "Comercial Andina SAC".into(),
            ruc: "20123456789".into(),
            address: None,
            provider_id: Some("persona-1".into()),
            provider_token: Some("tok".into()),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// A credit factura with the given totals; balance preset by the caller.
    fn document(
        tenant_id: &str,
        number: i64,
        total_cents: i64,
        detraction_cents: i64,
        balance_cents: i64,
    ) -> FiscalDocument {
        let now = Utc::now();
        FiscalDocument {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            doc_type: DocumentType::Factura,
            series: "F001".into(),
            number,
            currency: "PEN".into(),
            issue_date: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            customer_doc_type: CustomerDocType::Ruc,
            customer_doc_number: "20600055519".into(),
            customer_name: "Distribuidora Sur EIRL".into(),
            customer_address: None,
            taxable_cents: total_cents,
            igv_cents: 0,
            total_cents,
            detraction_cents,
            payment_form: PaymentForm::Credito,
            ref_doc_type: None,
            ref_series: None,
            ref_number: None,
            note_reason_code: None,
            note_reason: None,
            shipment_json: None,
            submission_state: SubmissionState::Pending,
            gateway_document_id: None,
            sunat_xml: None,
            sunat_cdr_zip: None,
            sunat_cdr_response: None,
            sunat_pdf_url: None,
            sunat_error_msg: None,
            retries_count: 0,
            next_retry_at: None,
            balance_cents,
            payment_status: PaymentStatus::Pending,
            voided: false,
            created_at: now,
            updated_at: now,
        }
    }

    async fn setup(total_cents: i64, detraction_cents: i64) -> (Database, PaymentLedger, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let t = tenant();
        db.tenants().insert(&t).await.unwrap();

        let balance = (total_cents - detraction_cents).max(0);
        let doc = document(&t.id, 1, total_cents, detraction_cents, balance);
        db.documents().insert(&doc, &[]).await.unwrap();

        let ledger = PaymentLedger::new(db.clone());
        (db, ledger, doc.id)
    }

    #[tokio::test]
    async fn test_partial_then_complete() {
        // netPayable = 100.00
        let (db, ledger, doc_id) = setup(10_000, 0).await;

        let receipt = ledger
            .register_payment(&doc_id, NewPayment::cash(Money::from_cents(6_000)))
            .await
            .unwrap();
        assert_eq!(receipt.balance.cents(), 4_000);
        assert_eq!(receipt.status, PaymentStatus::Partial);

        let receipt = ledger
            .register_payment(&doc_id, NewPayment::cash(Money::from_cents(4_000)))
            .await
            .unwrap();
        assert_eq!(receipt.balance, Money::zero());
        assert_eq!(receipt.status, PaymentStatus::Completed);

        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();
        assert_eq!(doc.balance_cents, 0);
        assert_eq!(doc.payment_status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_overdraw_rejected_and_balance_unchanged() {
        // netPayable = 40.00, existing payments = 30.00 → balance 10.00
        let (db, ledger, doc_id) = setup(4_000, 0).await;
        ledger
            .register_payment(&doc_id, NewPayment::cash(Money::from_cents(3_000)))
            .await
            .unwrap();

        // 15.00 exceeds the remaining 10.00
        let err = ledger
            .register_payment(&doc_id, NewPayment::cash(Money::from_cents(1_500)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::Validation(ValidationError::ExceedsBalance { .. })
        ));

        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();
        assert_eq!(doc.balance_cents, 1_000);
        assert_eq!(doc.payment_status, PaymentStatus::Partial);
        assert_eq!(db.payments().total_paid(&doc_id).await.unwrap(), 3_000);
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let (_db, ledger, doc_id) = setup(10_000, 0).await;

        let err = ledger
            .register_payment(&doc_id, NewPayment::cash(Money::zero()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::Validation(ValidationError::MustBePositive { .. })
        ));

        let err = ledger
            .register_payment(&doc_id, NewPayment::cash(Money::from_cents(-500)))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_and_voided_documents() {
        let (_db, ledger, doc_id) = setup(10_000, 0).await;

        let err = ledger
            .register_payment("missing", NewPayment::cash(Money::from_cents(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NotFound { .. }));

        ledger.void_document(&doc_id).await.unwrap();
        let err = ledger
            .register_payment(&doc_id, NewPayment::cash(Money::from_cents(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Voided { .. }));
    }

    #[tokio::test]
    async fn test_detraction_reduces_net_payable() {
        // total 100.00, detraction 12.00 → collectible 88.00
        let (_db, ledger, doc_id) = setup(10_000, 1_200).await;

        let err = ledger
            .register_payment(&doc_id, NewPayment::cash(Money::from_cents(9_000)))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));

        let receipt = ledger
            .register_payment(&doc_id, NewPayment::cash(Money::from_cents(8_800)))
            .await
            .unwrap();
        assert_eq!(receipt.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_zero_balance_credit_document_is_repaired() {
        // Legacy shape: credit document stored with balance = 0
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let t = tenant();
        db.tenants().insert(&t).await.unwrap();
        let doc = document(&t.id, 1, 10_000, 1_200, 0);
        db.documents().insert(&doc, &[]).await.unwrap();

        let ledger = PaymentLedger::new(db.clone());
        let receipt = ledger
            .register_payment(&doc.id, NewPayment::cash(Money::from_cents(5_000)))
            .await
            .unwrap();

        // Balance restored to 88.00 net, then the 50.00 applied
        assert_eq!(receipt.balance.cents(), 3_800);
        assert_eq!(receipt.status, PaymentStatus::Partial);
    }

    #[tokio::test]
    async fn test_reverse_reopens_completed_document() {
        let (db, ledger, doc_id) = setup(10_000, 0).await;

        ledger
            .register_payment(&doc_id, NewPayment::cash(Money::from_cents(6_000)))
            .await
            .unwrap();
        let receipt = ledger
            .register_payment(&doc_id, NewPayment::cash(Money::from_cents(4_000)))
            .await
            .unwrap();
        assert_eq!(receipt.status, PaymentStatus::Completed);

        let outcome = ledger.reverse_payment(&receipt.payment.id).await.unwrap();
        assert_eq!(outcome.balance.cents(), 4_000);
        assert_eq!(outcome.status, PaymentStatus::Partial);

        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();
        assert_eq!(doc.balance_cents, 4_000);
        assert!(db.payments().get_by_id(&receipt.payment.id).await.unwrap().is_none());

        let err = ledger.reverse_payment("missing").await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_reconcile_deletes_overdrawing_payments() {
        // net 88.00, but payments of 50.00 + 50.00 were forced in directly
        let (db, ledger, doc_id) = setup(10_000, 1_200).await;
        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();

        let mut p1 = raw_payment(&doc, 5_000);
        p1.paid_at = Utc::now() - chrono::Duration::hours(2);
        let mut p2 = raw_payment(&doc, 5_000);
        p2.paid_at = Utc::now() - chrono::Duration::hours(1);
        db.payments().insert(&p1).await.unwrap();
        db.payments().insert(&p2).await.unwrap();

        let summary = ledger.reconcile_balance(&doc_id).await.unwrap();
        assert_eq!(summary.net_payable.cents(), 8_800);
        // Oldest payment survives; the second would overdraw
        assert_eq!(summary.deleted_payment_ids, vec![p2.id.clone()]);
        assert_eq!(summary.balance.cents(), 3_800);
        assert_eq!(summary.status, PaymentStatus::Partial);

        // Idempotent: second run changes nothing
        let again = ledger.reconcile_balance(&doc_id).await.unwrap();
        assert!(again.deleted_payment_ids.is_empty());
        assert_eq!(again.balance, summary.balance);
        assert_eq!(again.status, summary.status);
        assert_eq!(db.payments().total_paid(&doc_id).await.unwrap(), 5_000);
    }

    #[tokio::test]
    async fn test_reconcile_exact_payments_complete() {
        let (db, ledger, doc_id) = setup(10_000, 0).await;
        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();

        db.payments().insert(&raw_payment(&doc, 10_000)).await.unwrap();

        let summary = ledger.reconcile_balance(&doc_id).await.unwrap();
        assert_eq!(summary.balance, Money::zero());
        assert_eq!(summary.status, PaymentStatus::Completed);
        assert!(summary.deleted_payment_ids.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_tenant_sweeps_credit_documents() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let t = tenant();
        db.tenants().insert(&t).await.unwrap();

        let doc_a = document(&t.id, 1, 10_000, 0, 123); // drifted balance
        let doc_b = document(&t.id, 2, 5_000, 0, 5_000);
        db.documents().insert(&doc_a, &[]).await.unwrap();
        db.documents().insert(&doc_b, &[]).await.unwrap();

        let ledger = PaymentLedger::new(db.clone());
        let summaries = ledger.reconcile_tenant(&t.id).await.unwrap();
        assert_eq!(summaries.len(), 2);

        // Drift repaired: no payments → full net payable outstanding
        let doc = db.documents().get_by_id(&doc_a.id).await.unwrap().unwrap();
        assert_eq!(doc.balance_cents, 10_000);
        assert_eq!(doc.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_list_payments() {
        let (_db, ledger, doc_id) = setup(10_000, 0).await;

        ledger
            .register_payment(&doc_id, NewPayment::cash(Money::from_cents(2_500)))
            .await
            .unwrap();
        ledger
            .register_payment(&doc_id, NewPayment::cash(Money::from_cents(1_500)))
            .await
            .unwrap();

        let listing = ledger.list_payments(&doc_id).await.unwrap();
        assert_eq!(listing.payments.len(), 2);
        assert_eq!(listing.total_paid.cents(), 4_000);
        assert_eq!(listing.balance.cents(), 6_000);
        assert_eq!(listing.status, PaymentStatus::Partial);
    }

    /// A payment row inserted directly, bypassing ledger validation.
    fn raw_payment(doc: &FiscalDocument, amount_cents: i64) -> Payment {
        Payment {
            id: Uuid::new_v4().to_string(),
            document_id: doc.id.clone(),
            tenant_id: doc.tenant_id.clone(),
            amount_cents,
            method: PaymentMethod::Cash,
            reference: None,
            note: None,
            paid_at: Utc::now(),
            created_at: Utc::now(),
        }
    }
}
