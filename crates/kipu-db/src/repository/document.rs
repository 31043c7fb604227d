//! # Fiscal Document Repository
//!
//! Database operations for fiscal documents and their lines, including the
//! state-gated updates the submission pipeline relies on.
//!
//! ## State-Gated Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              Why every submission UPDATE carries a WHERE                │
//! │                                                                         │
//! │  Three writers touch the same row:                                     │
//! │    • manual submit (request handler)                                   │
//! │    • poll job (re-checks SUBMITTED documents)                          │
//! │    • retry job (re-sends SUBMIT_FAILED documents)                      │
//! │                                                                         │
//! │  Every transition UPDATE is of the form                                │
//! │                                                                         │
//! │    UPDATE fiscal_documents SET submission_state = <next>, ...          │
//! │    WHERE id = ? AND submission_state IN (<states next is legal from>)  │
//! │                                                                         │
//! │  and the caller checks rows_affected. If another writer got there      │
//! │  first, the row no longer matches and the late writer gets             │
//! │  DbError::StaleState instead of silently overwriting a decision.       │
//! │                                                                         │
//! │  The transition TABLE lives in kipu_core::submission; this module      │
//! │  only enforces it at the persistence boundary.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use kipu_core::{DocumentLine, DocumentType, FiscalDocument};

/// Column list shared by every document SELECT (FromRow maps by name).
const DOCUMENT_COLUMNS: &str = "\
    id, tenant_id, doc_type, series, number, currency, issue_date, \
    customer_doc_type, customer_doc_number, customer_name, customer_address, \
    taxable_cents, igv_cents, total_cents, detraction_cents, payment_form, \
    ref_doc_type, ref_series, ref_number, note_reason_code, note_reason, \
    shipment_json, submission_state, gateway_document_id, sunat_xml, \
    sunat_cdr_zip, sunat_cdr_response, sunat_pdf_url, sunat_error_msg, \
    retries_count, next_retry_at, balance_cents, payment_status, voided, \
    created_at, updated_at";

/// Gateway artifacts persisted when a document reaches a decision.
#[derive(Debug, Clone, Default)]
pub struct SubmissionArtifacts {
    /// Signed XML, if the gateway returned it.
    pub xml: Option<String>,
    /// CDR zip (base64), if present.
    pub cdr_zip: Option<String>,
    /// Raw JSON of the gateway's last status response.
    pub raw_response: Option<String>,
    /// Rendered PDF URL, if the gateway produced one.
    pub pdf_url: Option<String>,
}

/// Repository for fiscal document database operations.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    /// Creates a new DocumentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DocumentRepository { pool }
    }

    // =========================================================================
    // Creation / Reads
    // =========================================================================

    /// Inserts a document together with its lines in one transaction.
    ///
    /// Either everything lands or nothing does — a document without its
    /// lines would build an empty payload.
    pub async fn insert(&self, doc: &FiscalDocument, lines: &[DocumentLine]) -> DbResult<()> {
        debug!(id = %doc.id, number = %doc.full_number(), "Inserting fiscal document");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO fiscal_documents (
                id, tenant_id, doc_type, series, number, currency, issue_date,
                customer_doc_type, customer_doc_number, customer_name, customer_address,
                taxable_cents, igv_cents, total_cents, detraction_cents, payment_form,
                ref_doc_type, ref_series, ref_number, note_reason_code, note_reason,
                shipment_json, submission_state, gateway_document_id, sunat_xml,
                sunat_cdr_zip, sunat_cdr_response, sunat_pdf_url, sunat_error_msg,
                retries_count, next_retry_at, balance_cents, payment_status, voided,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20, ?21,
                ?22, ?23, ?24, ?25,
                ?26, ?27, ?28, ?29,
                ?30, ?31, ?32, ?33, ?34,
                ?35, ?36
            )
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.tenant_id)
        .bind(doc.doc_type)
        .bind(&doc.series)
        .bind(doc.number)
        .bind(&doc.currency)
        .bind(doc.issue_date)
        .bind(doc.customer_doc_type)
        .bind(&doc.customer_doc_number)
        .bind(&doc.customer_name)
        .bind(&doc.customer_address)
        .bind(doc.taxable_cents)
        .bind(doc.igv_cents)
        .bind(doc.total_cents)
        .bind(doc.detraction_cents)
        .bind(doc.payment_form)
        .bind(doc.ref_doc_type)
        .bind(&doc.ref_series)
        .bind(doc.ref_number)
        .bind(&doc.note_reason_code)
        .bind(&doc.note_reason)
        .bind(&doc.shipment_json)
        .bind(doc.submission_state)
        .bind(&doc.gateway_document_id)
        .bind(&doc.sunat_xml)
        .bind(&doc.sunat_cdr_zip)
        .bind(&doc.sunat_cdr_response)
        .bind(&doc.sunat_pdf_url)
        .bind(&doc.sunat_error_msg)
        .bind(doc.retries_count)
        .bind(doc.next_retry_at)
        .bind(doc.balance_cents)
        .bind(doc.payment_status)
        .bind(doc.voided)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&mut *tx)
        .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO document_lines (
                    id, document_id, line_number, description, product_code,
                    quantity, unit_code, unit_price_cents, line_total_cents,
                    igv_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(&line.id)
            .bind(&line.document_id)
            .bind(line.line_number)
            .bind(&line.description)
            .bind(&line.product_code)
            .bind(line.quantity)
            .bind(&line.unit_code)
            .bind(line.unit_price_cents)
            .bind(line.line_total_cents)
            .bind(line.igv_cents)
            .bind(line.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Gets a document by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<FiscalDocument>> {
        let doc = sqlx::query_as::<_, FiscalDocument>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM fiscal_documents WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(doc)
    }

    /// Gets all lines for a document, in declaration order.
    pub async fn get_lines(&self, document_id: &str) -> DbResult<Vec<DocumentLine>> {
        let lines = sqlx::query_as::<_, DocumentLine>(
            r#"
            SELECT
                id, document_id, line_number, description, product_code,
                quantity, unit_code, unit_price_cents, line_total_cents,
                igv_cents, created_at
            FROM document_lines
            WHERE document_id = ?1
            ORDER BY line_number
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Next correlative number for a (tenant, type, series).
    pub async fn next_number(
        &self,
        tenant_id: &str,
        doc_type: DocumentType,
        series: &str,
    ) -> DbResult<i64> {
        let max: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(number) FROM fiscal_documents
            WHERE tenant_id = ?1 AND doc_type = ?2 AND series = ?3
            "#,
        )
        .bind(tenant_id)
        .bind(doc_type)
        .bind(series)
        .fetch_one(&self.pool)
        .await?;

        Ok(max.unwrap_or(0) + 1)
    }

    // =========================================================================
    // Scheduler Selections
    // =========================================================================

    /// Documents the poll job should re-check: accepted by the gateway
    /// transport, correlation id known, decision still outstanding.
    ///
    /// A `pending` document is never returned here — it has nothing to poll.
    pub async fn find_pollable(&self, limit: u32) -> DbResult<Vec<FiscalDocument>> {
        let docs = sqlx::query_as::<_, FiscalDocument>(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS} FROM fiscal_documents
            WHERE submission_state = 'submitted'
              AND gateway_document_id IS NOT NULL
            ORDER BY updated_at ASC
            LIMIT ?1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(docs)
    }

    /// Documents the retry job should re-send: submission failed and the
    /// backoff window has elapsed. Earliest-due-first, bounded batch.
    pub async fn find_retry_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<FiscalDocument>> {
        let docs = sqlx::query_as::<_, FiscalDocument>(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS} FROM fiscal_documents
            WHERE submission_state = 'submit_failed'
              AND next_retry_at IS NOT NULL
              AND next_retry_at <= ?1
            ORDER BY next_retry_at ASC
            LIMIT ?2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(docs)
    }

    // =========================================================================
    // State-Gated Submission Updates
    // =========================================================================

    /// Pending/SubmitFailed → Submitted: the gateway holds the document and
    /// assigned a correlation id.
    pub async fn mark_submitted(
        &self,
        id: &str,
        gateway_document_id: &str,
        raw_response: Option<&str>,
    ) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE fiscal_documents SET
                submission_state = 'submitted',
                gateway_document_id = ?2,
                sunat_cdr_response = COALESCE(?3, sunat_cdr_response),
                sunat_error_msg = NULL,
                updated_at = ?4
            WHERE id = ?1
              AND submission_state IN ('pending', 'submit_failed')
            "#,
        )
        .bind(id)
        .bind(gateway_document_id)
        .bind(raw_response)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::stale_state(id, "pending|submit_failed"));
        }

        Ok(())
    }

    /// Submitted → Accepted: persists the signed XML and confirmation
    /// receipt; the document becomes immutable except for payment fields.
    pub async fn mark_accepted(&self, id: &str, artifacts: &SubmissionArtifacts) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE fiscal_documents SET
                submission_state = 'accepted',
                sunat_xml = COALESCE(?2, sunat_xml),
                sunat_cdr_zip = COALESCE(?3, sunat_cdr_zip),
                sunat_cdr_response = COALESCE(?4, sunat_cdr_response),
                sunat_pdf_url = COALESCE(?5, sunat_pdf_url),
                sunat_error_msg = NULL,
                next_retry_at = NULL,
                updated_at = ?6
            WHERE id = ?1
              AND submission_state = 'submitted'
            "#,
        )
        .bind(id)
        .bind(&artifacts.xml)
        .bind(&artifacts.cdr_zip)
        .bind(&artifacts.raw_response)
        .bind(&artifacts.pdf_url)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::stale_state(id, "submitted"));
        }

        Ok(())
    }

    /// Submitted → Rejected: a tax-authority decision, terminal. The reason
    /// is kept for the operator; re-issuance means a NEW document.
    pub async fn mark_rejected(
        &self,
        id: &str,
        error_msg: &str,
        raw_response: Option<&str>,
    ) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE fiscal_documents SET
                submission_state = 'rejected',
                sunat_error_msg = ?2,
                sunat_cdr_response = COALESCE(?3, sunat_cdr_response),
                next_retry_at = NULL,
                updated_at = ?4
            WHERE id = ?1
              AND submission_state = 'submitted'
            "#,
        )
        .bind(id)
        .bind(error_msg)
        .bind(raw_response)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::stale_state(id, "submitted"));
        }

        Ok(())
    }

    /// Pending/SubmitFailed → SubmitFailed: transport never delivered the
    /// document; schedule the next attempt.
    pub async fn mark_submit_failed(
        &self,
        id: &str,
        error_msg: &str,
        retries_count: i64,
        next_retry_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE fiscal_documents SET
                submission_state = 'submit_failed',
                sunat_error_msg = ?2,
                retries_count = ?3,
                next_retry_at = ?4,
                updated_at = ?5
            WHERE id = ?1
              AND submission_state IN ('pending', 'submit_failed')
            "#,
        )
        .bind(id)
        .bind(error_msg)
        .bind(retries_count)
        .bind(next_retry_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::stale_state(id, "pending|submit_failed"));
        }

        Ok(())
    }

    // =========================================================================
    // Annulment
    // =========================================================================

    /// Marks a document voided (operator annulment). Voided documents accept
    /// no further payments.
    pub async fn mark_voided(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE fiscal_documents SET
                voided = 1,
                updated_at = ?2
            WHERE id = ?1 AND voided = 0
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("FiscalDocument (not voided)", id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
