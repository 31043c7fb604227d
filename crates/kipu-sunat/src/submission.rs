//! # Submission Service
//!
//! Drives a document through one gateway exchange and applies the resulting
//! state transition. Every path into SUNAT — the manual submit handler, the
//! retry job, the poll job — goes through this service, which is what keeps
//! the five-state machine authoritative.
//!
//! ## One Submission, End to End
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    submit(document_id)                                  │
//! │                                                                         │
//! │  1. acquire per-document lock  ← at-most-one in-flight submission      │
//! │  2. load document              ← must be PENDING or SUBMIT_FAILED      │
//! │  3. load tenant credentials    ← MissingCredentials without both       │
//! │  4. build UBL payload          ← pure, ValidationError stops here      │
//! │  5. gateway submit + poll                                               │
//! │       │                                                                 │
//! │       ├─ Ok(report) ──► next_state(TransportAccepted) → SUBMITTED      │
//! │       │                 then decision:                                  │
//! │       │                   Accepted  → ACCEPTED (persist xml + cdr)     │
//! │       │                   Rejected  → REJECTED (persist reason)        │
//! │       │                   Pending   → stay SUBMITTED (poll job's turn) │
//! │       │                                                                 │
//! │       └─ Err(retryable) ──► next_state(TransportFailed)                │
//! │                             → SUBMIT_FAILED, retries+1,                │
//! │                               next_retry_at = now + base·2^retries     │
//! │                             error propagates to the caller             │
//! │                                                                         │
//! │  6. release lock (guard drop)                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, warn};

use kipu_core::submission::{next_state, SubmissionOutcome};
use kipu_core::{ubl, FiscalDocument, SubmissionState};
use kipu_db::{Database, SubmissionArtifacts};

use crate::config::SunatConfig;
use crate::error::{SunatError, SunatResult};
use crate::gateway::{DocumentGateway, GatewayDecision, GatewayReport};
use crate::locks::DocumentLocks;

/// Submission service over an injected gateway implementation.
pub struct SubmissionService<G: DocumentGateway> {
    db: Database,
    gateway: Arc<G>,
    locks: DocumentLocks,
    config: SunatConfig,
}

impl<G: DocumentGateway> SubmissionService<G> {
    /// Creates a new submission service.
    pub fn new(db: Database, gateway: Arc<G>, config: SunatConfig) -> Self {
        SubmissionService {
            db,
            gateway,
            locks: DocumentLocks::new(),
            config,
        }
    }

    // =========================================================================
    // Submit Path (PENDING / SUBMIT_FAILED)
    // =========================================================================

    /// Submits a document to the tax authority and returns its new state.
    ///
    /// Works for first submissions and scheduled retries alike — the state
    /// machine treats both identically. Synchronous failures (validation,
    /// wrong state, missing credentials) leave the document untouched;
    /// transport-class failures record `SUBMIT_FAILED` with the next retry
    /// window before propagating.
    pub async fn submit(&self, document_id: &str) -> SunatResult<SubmissionState> {
        let _guard = self.locks.acquire(document_id).await;

        let documents = self.db.documents();

        let doc = documents
            .get_by_id(document_id)
            .await?
            .ok_or_else(|| SunatError::NotFound {
                entity: "FiscalDocument".into(),
                id: document_id.into(),
            })?;

        if doc.voided {
            return Err(SunatError::Voided {
                document_id: doc.id,
            });
        }

        if !doc.submission_state.is_retry_eligible() {
            return Err(SunatError::InvalidState {
                document_id: doc.id,
                state: doc.submission_state,
            });
        }

        let tenant = self
            .db
            .tenants()
            .get_by_id(&doc.tenant_id)
            .await?
            .ok_or_else(|| SunatError::NotFound {
                entity: "Tenant".into(),
                id: doc.tenant_id.clone(),
            })?;

        let credentials = tenant
            .credentials()
            .ok_or_else(|| SunatError::MissingCredentials {
                tenant_id: tenant.id.clone(),
            })?;

        let lines = documents.get_lines(&doc.id).await?;
        let body = ubl::build_payload(&doc, &lines, &tenant)?;
        let file_name = ubl::gateway_file_name(&tenant.ruc, doc.doc_type, &doc.series, doc.number);

        match self
            .gateway
            .submit_and_poll(&credentials, &file_name, &body)
            .await
        {
            Ok(report) => self.apply_report(&doc, report).await,

            Err(e) if e.is_retryable() => {
                // Consult the machine even though only one successor exists:
                // a terminal document can never be dragged back here.
                let state = next_state(doc.submission_state, SubmissionOutcome::TransportFailed)?;

                let retries = doc.retries_count + 1;
                let next_retry_at = Utc::now() + self.backoff_window(doc.retries_count);

                documents
                    .mark_submit_failed(&doc.id, &e.to_string(), retries, next_retry_at)
                    .await?;

                warn!(
                    document_id = %doc.id,
                    error = %e,
                    retries,
                    next_retry_at = %next_retry_at,
                    "Submission failed before reaching the gateway, retry scheduled"
                );

                debug_assert_eq!(state, SubmissionState::SubmitFailed);
                Err(e)
            }

            // Non-retryable gateway errors don't exist today (Rejected comes
            // back inside Ok reports), but keep the fall-through honest.
            Err(e) => Err(e),
        }
    }

    /// Applies a successful gateway exchange: transport transition first,
    /// then the decision, each behind its own state-gated write.
    async fn apply_report(
        &self,
        doc: &FiscalDocument,
        report: GatewayReport,
    ) -> SunatResult<SubmissionState> {
        let documents = self.db.documents();

        let submitted = next_state(doc.submission_state, SubmissionOutcome::TransportAccepted)?;
        documents
            .mark_submitted(&doc.id, &report.document_id, report.raw_response.as_deref())
            .await?;

        match report.decision {
            GatewayDecision::Accepted => {
                let state = next_state(submitted, SubmissionOutcome::Accepted)?;
                let artifacts = SubmissionArtifacts {
                    xml: report.xml,
                    cdr_zip: report.cdr_zip,
                    raw_response: report.raw_response,
                    pdf_url: report.pdf_url,
                };
                documents.mark_accepted(&doc.id, &artifacts).await?;

                info!(
                    document_id = %doc.id,
                    number = %doc.full_number(),
                    "Document accepted by SUNAT"
                );
                Ok(state)
            }

            GatewayDecision::Rejected { reason } => {
                let state = next_state(submitted, SubmissionOutcome::Rejected)?;
                documents
                    .mark_rejected(&doc.id, &reason, report.raw_response.as_deref())
                    .await?;

                warn!(
                    document_id = %doc.id,
                    number = %doc.full_number(),
                    reason = %reason,
                    "Document rejected by SUNAT, requires re-issuance"
                );
                Ok(state)
            }

            GatewayDecision::Pending => {
                let state = next_state(submitted, SubmissionOutcome::StillPending)?;
                info!(
                    document_id = %doc.id,
                    gateway_document_id = %report.document_id,
                    "Gateway holds the document, awaiting decision"
                );
                Ok(state)
            }
        }
    }

    // =========================================================================
    // Refresh Path (SUBMITTED)
    // =========================================================================

    /// Re-checks a SUBMITTED document's status without re-sending it.
    ///
    /// Used by the poll job and by operators who don't want to wait for it.
    /// `PENDIENTE` is a no-op: the document stays `Submitted` untouched.
    pub async fn refresh(&self, document_id: &str) -> SunatResult<SubmissionState> {
        let _guard = self.locks.acquire(document_id).await;

        let documents = self.db.documents();

        let doc = documents
            .get_by_id(document_id)
            .await?
            .ok_or_else(|| SunatError::NotFound {
                entity: "FiscalDocument".into(),
                id: document_id.into(),
            })?;

        if doc.submission_state != SubmissionState::Submitted {
            return Err(SunatError::InvalidState {
                document_id: doc.id,
                state: doc.submission_state,
            });
        }

        let gateway_id = doc.gateway_document_id.as_deref().ok_or_else(|| {
            SunatError::Protocol(format!(
                "document {} is submitted but has no correlation id",
                doc.id
            ))
        })?;

        let tenant = self
            .db
            .tenants()
            .get_by_id(&doc.tenant_id)
            .await?
            .ok_or_else(|| SunatError::NotFound {
                entity: "Tenant".into(),
                id: doc.tenant_id.clone(),
            })?;

        let credentials = tenant
            .credentials()
            .ok_or_else(|| SunatError::MissingCredentials {
                tenant_id: tenant.id.clone(),
            })?;

        let status = self
            .gateway
            .fetch_status(&credentials.provider_token, gateway_id)
            .await?;
        let raw = status.raw.to_string();

        match status.status {
            crate::gateway::GatewayStatus::Aceptado => {
                let state = next_state(doc.submission_state, SubmissionOutcome::Accepted)?;
                let artifacts = SubmissionArtifacts {
                    xml: status.xml,
                    cdr_zip: status.cdr_zip,
                    raw_response: Some(raw),
                    pdf_url: status.pdf_url,
                };
                documents.mark_accepted(&doc.id, &artifacts).await?;

                info!(document_id = %doc.id, "Document accepted by SUNAT");
                Ok(state)
            }

            crate::gateway::GatewayStatus::Rechazado => {
                let state = next_state(doc.submission_state, SubmissionOutcome::Rejected)?;
                let reason = status.rejection_reason();
                documents
                    .mark_rejected(&doc.id, &reason, Some(&raw))
                    .await?;

                warn!(document_id = %doc.id, reason = %reason, "Document rejected by SUNAT");
                Ok(state)
            }

            crate::gateway::GatewayStatus::Pendiente => {
                // SUBMITTED → SUBMITTED: explicitly a no-op, no write
                let state = next_state(doc.submission_state, SubmissionOutcome::StillPending)?;
                Ok(state)
            }
        }
    }

    // =========================================================================
    // Retry Windows
    // =========================================================================

    /// Exponential retry window: `base * 2^prior_retries`, capped.
    fn backoff_window(&self, prior_retries: i64) -> ChronoDuration {
        let base = self.config.scheduler.retry_backoff_base_secs;
        let cap = self.config.scheduler.retry_backoff_cap_secs;

        let exponent = prior_retries.clamp(0, 16) as u32;
        let secs = base.saturating_mul(2u64.saturating_pow(exponent)).min(cap);

        ChronoDuration::seconds(secs as i64)
    }

    /// The database handle this service operates on.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// The injected gateway (test hook).
    #[cfg(test)]
    pub(crate) fn gateway(&self) -> &G {
        &self.gateway
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        accepted_report, pending_report, rejected_report, setup_document, status_aceptado,
        status_excepcion, status_pendiente, MockGateway,
    };
    use std::sync::atomic::Ordering;

    fn service(db: Database, gateway: MockGateway) -> Arc<SubmissionService<MockGateway>> {
        Arc::new(SubmissionService::new(
            db,
            Arc::new(gateway),
            SunatConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_submit_pending_decision_leaves_document_submitted() {
        let (db, doc_id) = setup_document().await;
        let gateway = MockGateway::default();
        gateway.push_submit(Ok(pending_report("ext-1")));

        let svc = service(db.clone(), gateway);
        let state = svc.submit(&doc_id).await.unwrap();
        assert_eq!(state, SubmissionState::Submitted);

        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();
        assert_eq!(doc.submission_state, SubmissionState::Submitted);
        assert_eq!(doc.gateway_document_id.as_deref(), Some("ext-1"));
        assert_eq!(doc.retries_count, 0);
    }

    #[tokio::test]
    async fn test_submit_immediate_acceptance_persists_artifacts() {
        let (db, doc_id) = setup_document().await;
        let gateway = MockGateway::default();
        gateway.push_submit(Ok(accepted_report("ext-2")));

        let svc = service(db.clone(), gateway);
        let state = svc.submit(&doc_id).await.unwrap();
        assert_eq!(state, SubmissionState::Accepted);

        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();
        assert_eq!(doc.submission_state, SubmissionState::Accepted);
        assert!(doc.sunat_xml.is_some());
        assert!(doc.sunat_cdr_zip.is_some());
        assert!(doc.sunat_error_msg.is_none());
    }

    #[tokio::test]
    async fn test_submit_rejection_is_terminal_with_reason() {
        let (db, doc_id) = setup_document().await;
        let gateway = MockGateway::default();
        gateway.push_submit(Ok(rejected_report("ext-3", "RUC del adquiriente no existe")));

        let svc = service(db.clone(), gateway);
        let state = svc.submit(&doc_id).await.unwrap();
        assert_eq!(state, SubmissionState::Rejected);

        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();
        assert_eq!(
            doc.sunat_error_msg.as_deref(),
            Some("RUC del adquiriente no existe")
        );

        // A rejected document cannot be re-submitted
        let err = svc.submit(&doc_id).await.unwrap_err();
        assert!(matches!(err, SunatError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_transport_failure_schedules_retry() {
        let (db, doc_id) = setup_document().await;
        let gateway = MockGateway::default();
        gateway.push_submit(Err(SunatError::Transport("connection refused".into())));

        let svc = service(db.clone(), gateway);
        let before = Utc::now();
        let err = svc.submit(&doc_id).await.unwrap_err();
        assert!(err.is_retryable());

        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();
        assert_eq!(doc.submission_state, SubmissionState::SubmitFailed);
        assert_eq!(doc.retries_count, 1);
        assert!(doc.sunat_error_msg.unwrap().contains("connection refused"));

        // First window: base (300s), no doubling yet
        let next = doc.next_retry_at.unwrap();
        let window = next - before;
        assert!(window >= ChronoDuration::seconds(299));
        assert!(window <= ChronoDuration::seconds(302));
    }

    #[tokio::test]
    async fn test_backoff_doubles_and_caps() {
        let (db, _doc_id) = setup_document().await;
        let svc = service(db, MockGateway::default());

        assert_eq!(svc.backoff_window(0), ChronoDuration::seconds(300));
        assert_eq!(svc.backoff_window(1), ChronoDuration::seconds(600));
        assert_eq!(svc.backoff_window(3), ChronoDuration::seconds(2_400));
        // Cap: 6 hours
        assert_eq!(svc.backoff_window(10), ChronoDuration::seconds(21_600));
        assert_eq!(svc.backoff_window(1_000), ChronoDuration::seconds(21_600));
    }

    #[tokio::test]
    async fn test_submit_requires_credentials() {
        let (db, doc_id) = setup_document().await;

        // Blank credentials count as absent
        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();
        db.tenants()
            .update_credentials(&doc.tenant_id, "", "")
            .await
            .unwrap();

        let gateway = MockGateway::default();
        let svc = service(db, gateway);
        let err = svc.submit(&doc_id).await.unwrap_err();
        assert!(matches!(err, SunatError::MissingCredentials { .. }));
    }

    #[tokio::test]
    async fn test_submit_voided_document_fails() {
        let (db, doc_id) = setup_document().await;
        db.documents().mark_voided(&doc_id).await.unwrap();

        let svc = service(db, MockGateway::default());
        let err = svc.submit(&doc_id).await.unwrap_err();
        assert!(matches!(err, SunatError::Voided { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_submits_yield_single_correlation_id() {
        let (db, doc_id) = setup_document().await;

        let gateway = MockGateway::default();
        gateway.set_submit_delay(std::time::Duration::from_millis(30));
        gateway.push_submit(Ok(pending_report("ext-once")));
        gateway.push_submit(Ok(pending_report("ext-second")));

        let svc = service(db.clone(), gateway);
        let (a, b) = tokio::join!(svc.submit(&doc_id), svc.submit(&doc_id));

        // Exactly one submission wins; the other finds the document already
        // SUBMITTED and never reaches the gateway
        let oks = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(oks, 1);
        assert_eq!(svc.gateway.submit_calls.load(Ordering::SeqCst), 1);

        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();
        assert_eq!(doc.gateway_document_id.as_deref(), Some("ext-once"));
    }

    #[tokio::test]
    async fn test_refresh_applies_decision() {
        let (db, doc_id) = setup_document().await;
        let gateway = MockGateway::default();
        gateway.push_submit(Ok(pending_report("ext-7")));
        gateway.push_status(Ok(status_pendiente()));
        gateway.push_status(Ok(status_aceptado()));

        let svc = service(db.clone(), gateway);
        svc.submit(&doc_id).await.unwrap();

        // First refresh: still pending, no state change
        let state = svc.refresh(&doc_id).await.unwrap();
        assert_eq!(state, SubmissionState::Submitted);

        // Second refresh: accepted, artifacts land
        let state = svc.refresh(&doc_id).await.unwrap();
        assert_eq!(state, SubmissionState::Accepted);

        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();
        assert_eq!(doc.submission_state, SubmissionState::Accepted);
        assert!(doc.sunat_xml.is_some());
    }

    #[tokio::test]
    async fn test_refresh_applies_rejection() {
        let (db, doc_id) = setup_document().await;
        let gateway = MockGateway::default();
        gateway.push_submit(Ok(pending_report("ext-8")));
        gateway.push_status(Ok(status_excepcion("Serie no autorizada")));

        let svc = service(db.clone(), gateway);
        svc.submit(&doc_id).await.unwrap();

        let state = svc.refresh(&doc_id).await.unwrap();
        assert_eq!(state, SubmissionState::Rejected);

        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();
        assert_eq!(doc.sunat_error_msg.as_deref(), Some("Serie no autorizada"));
    }

    #[tokio::test]
    async fn test_end_to_end_submission_then_collection() {
        use kipu_billing::{NewPayment, PaymentLedger};
        use kipu_core::{Money, PaymentStatus};

        // netPayable = 100.00
        let (db, doc_id) = setup_document().await;
        let gateway = MockGateway::default();
        gateway.push_submit(Ok(pending_report("ext-e2e")));
        gateway.push_status(Ok(status_aceptado()));

        let svc = service(db.clone(), gateway);

        // Submit: gateway returns PENDIENTE with a correlation id
        assert_eq!(svc.submit(&doc_id).await.unwrap(), SubmissionState::Submitted);

        // Poll run: gateway now reports ACEPTADO; artifacts persist
        assert_eq!(svc.refresh(&doc_id).await.unwrap(), SubmissionState::Accepted);
        let doc = db.documents().get_by_id(&doc_id).await.unwrap().unwrap();
        assert!(doc.sunat_xml.is_some());
        assert!(doc.sunat_cdr_zip.is_some());

        // Money moves independently of submission state
        let ledger = PaymentLedger::new(db.clone());

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
    }

    #[tokio::test]
    async fn test_refresh_rejects_unsubmitted_document() {
        let (db, doc_id) = setup_document().await;
        let svc = service(db, MockGateway::default());

        // PENDING documents are never polled
        let err = svc.refresh(&doc_id).await.unwrap_err();
        assert!(matches!(err, SunatError::InvalidState { .. }));
    }
}
