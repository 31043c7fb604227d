//! # Payment Repository
//!
//! Read-side payment queries. The WRITE side (register/reverse/reconcile)
//! lives in kipu-billing, where every mutation runs inside a transaction
//! together with the balance update; this repository exists for plain reads
//! and for seeding.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use kipu_core::Payment;

const PAYMENT_COLUMNS: &str = "\
    id, document_id, tenant_id, amount_cents, method, reference, note, \
    paid_at, created_at";

/// Repository for payment database operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Inserts a payment row.
    ///
    /// Note: this does NOT touch the document balance. Use the ledger for
    /// the real registration flow.
    pub async fn insert(&self, payment: &Payment) -> DbResult<()> {
        debug!(
            document_id = %payment.document_id,
            amount = %payment.amount(),
            "Inserting payment"
        );

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
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a payment by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// All payments for a document, newest first (what the operator sees).
    pub async fn list_for_document(&self, document_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE document_id = ?1
            ORDER BY paid_at DESC, created_at DESC
            "#
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Total céntimos collected against a document.
    pub async fn total_paid(&self, document_id: &str) -> DbResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(amount_cents) FROM payments WHERE document_id = ?1",
        )
        .bind(document_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use crate::testing;

    #[tokio::test]
    async fn test_insert_list_and_total() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = testing::sample_tenant();
        db.tenants().insert(&tenant).await.unwrap();
        let doc = testing::sample_document(&tenant.id, 1);
        db.documents().insert(&doc, &[]).await.unwrap();

        let repo = db.payments();
        repo.insert(&testing::sample_payment(&doc, "p-1", 3_000))
            .await
            .unwrap();
        repo.insert(&testing::sample_payment(&doc, "p-2", 2_500))
            .await
            .unwrap();

        assert_eq!(repo.total_paid(&doc.id).await.unwrap(), 5_500);
        assert_eq!(repo.list_for_document(&doc.id).await.unwrap().len(), 2);
        assert!(repo.get_by_id("p-1").await.unwrap().is_some());
        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }
}
