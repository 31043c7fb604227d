//! # kipu-sunat: SUNAT Submission Engine
//!
//! Asynchronous document submission to the tax-authority gateway, status
//! polling, retry scheduling, and the state machine driving it all.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     kipu-sunat Architecture                             │
//! │                                                                         │
//! │  manual submit ─────┐                                                  │
//! │                     ▼                                                   │
//! │  ┌───────────┐   ┌────────────────────┐   ┌────────────────────────┐   │
//! │  │ Scheduler │──►│ SubmissionService  │──►│ GatewayClient (HTTP)   │   │
//! │  │           │   │                    │   │                        │   │
//! │  │ poll job  │   │ • per-doc lock     │   │ • POST sendBill        │   │
//! │  │ retry job │   │ • next_state(...)  │   │ • bounded status poll  │   │
//! │  └───────────┘   │ • state-gated      │   └────────────────────────┘   │
//! │                  │   persistence      │                                │
//! │                  └────────────────────┘                                │
//! │                                                                         │
//! │  The service is generic over the DocumentGateway trait; tests inject   │
//! │  a scripted gateway and exercise the whole machine without a network.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use kipu_db::{Database, DbConfig};
//! use kipu_sunat::{GatewayClient, Scheduler, SubmissionService, SunatConfig};
//!
//! let db = Database::new(DbConfig::new("./kipu.db")).await?;
//! let config = SunatConfig::default();
//!
//! let gateway = Arc::new(GatewayClient::new(config.gateway.clone())?);
//! let service = Arc::new(SubmissionService::new(db, gateway, config.clone()));
//!
//! let mut scheduler = Scheduler::new(service.clone(), config.scheduler.clone());
//! scheduler.start();
//!
//! // ... serve requests; manual submissions call service.submit(id) ...
//!
//! scheduler.shutdown().await;
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod locks;
pub mod scheduler;
pub mod submission;

pub use config::{GatewaySettings, SchedulerSettings, SunatConfig};
pub use error::{SunatError, SunatResult};
pub use gateway::{
    DocumentGateway, DocumentStatus, GatewayClient, GatewayDecision, GatewayReport, GatewayStatus,
};
pub use locks::DocumentLocks;
pub use scheduler::Scheduler;
pub use submission::SubmissionService;

// =============================================================================
// Test Support
// =============================================================================

/// Shared fixtures and the scripted gateway used by this crate's tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use serde_json::{json, Value};
    use uuid::Uuid;

    use kipu_core::{
        CustomerDocType, DocumentLine, DocumentType, FiscalDocument, GatewayCredentials,
        PaymentForm, PaymentStatus, SubmissionState, Tenant,
    };
    use kipu_db::{Database, DbConfig};

    use crate::error::SunatResult;
    use crate::gateway::{
        DocumentGateway, DocumentStatus, GatewayDecision, GatewayReport,
    };

    /// Opt-in log output for debugging a failing test:
    /// `RUST_LOG=debug cargo test -p kipu-sunat -- --nocapture`
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    // =========================================================================
    // Scripted Gateway
    // =========================================================================

    /// A gateway whose responses are scripted per call, FIFO. Unscripted
    /// calls default to "pending" so tests only state what they care about.
    #[derive(Default)]
    pub struct MockGateway {
        pub submit_calls: AtomicUsize,
        pub status_calls: AtomicUsize,
        submit_script: Mutex<VecDeque<SunatResult<GatewayReport>>>,
        status_script: Mutex<VecDeque<SunatResult<DocumentStatus>>>,
        submit_delay: Mutex<Option<Duration>>,
    }

    impl MockGateway {
        pub fn push_submit(&self, result: SunatResult<GatewayReport>) {
            self.submit_script.lock().unwrap().push_back(result);
        }

        pub fn push_status(&self, result: SunatResult<DocumentStatus>) {
            self.status_script.lock().unwrap().push_back(result);
        }

        /// Makes submit_and_poll dwell, widening race windows on purpose.
        pub fn set_submit_delay(&self, delay: Duration) {
            *self.submit_delay.lock().unwrap() = Some(delay);
        }
    }

    #[async_trait]
    impl DocumentGateway for MockGateway {
        async fn submit_and_poll(
            &self,
            _credentials: &GatewayCredentials,
            _file_name: &str,
            _document_body: &Value,
        ) -> SunatResult<GatewayReport> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);

            let delay = *self.submit_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            self.submit_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(pending_report("ext-default")))
        }

        async fn fetch_status(
            &self,
            _provider_token: &str,
            _document_id: &str,
        ) -> SunatResult<DocumentStatus> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);

            self.status_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(status_pendiente()))
        }
    }

    // =========================================================================
    // Report / Status Builders
    // =========================================================================

    pub fn pending_report(document_id: &str) -> GatewayReport {
        GatewayReport {
            document_id: document_id.to_string(),
            decision: GatewayDecision::Pending,
            xml: None,
            cdr_zip: None,
            pdf_url: None,
            raw_response: Some(r#"{"status":"PENDIENTE"}"#.to_string()),
        }
    }

    pub fn accepted_report(document_id: &str) -> GatewayReport {
        GatewayReport {
            document_id: document_id.to_string(),
            decision: GatewayDecision::Accepted,
            xml: Some("<Invoice/>".to_string()),
            cdr_zip: Some("UEsDBA==".to_string()),
            pdf_url: Some("https://cdn/doc.pdf".to_string()),
            raw_response: Some(r#"{"status":"ACEPTADO"}"#.to_string()),
        }
    }

    pub fn rejected_report(document_id: &str, reason: &str) -> GatewayReport {
        GatewayReport {
            document_id: document_id.to_string(),
            decision: GatewayDecision::Rejected {
                reason: reason.to_string(),
            },
            xml: None,
            cdr_zip: None,
            pdf_url: None,
            raw_response: Some(r#"{"status":"EXCEPCION"}"#.to_string()),
        }
    }

    pub fn status_pendiente() -> DocumentStatus {
        DocumentStatus::from_value(json!({ "status": "PENDIENTE" })).unwrap()
    }

    pub fn status_aceptado() -> DocumentStatus {
        DocumentStatus::from_value(json!({
            "status": "ACEPTADO",
            "xml": "<Invoice/>",
            "cdr": "UEsDBA==",
            "pdf": { "A4": "https://cdn/doc.pdf" },
        }))
        .unwrap()
    }

    pub fn status_excepcion(message: &str) -> DocumentStatus {
        DocumentStatus::from_value(json!({
            "status": "EXCEPCION",
            "error": { "message": message },
        }))
        .unwrap()
    }

    // =========================================================================
    // Database Fixtures
    // =========================================================================

    pub fn sample_tenant() -> Tenant {
        Tenant {
            id: Uuid::new_v4().to_string(),
            business_name: "Comercial Andina SAC".into(),
            ruc: "20123456789".into(),
            address: Some("Jr. Unión 500, Lima".into()),
            provider_id: Some("persona-1".into()),
            provider_token: Some("tok-abc".into()),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn sample_document(tenant_id: &str, number: i64) -> FiscalDocument {
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
            taxable_cents: 8_475,
            igv_cents: 1_525,
            total_cents: 10_000,
            detraction_cents: 0,
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
            balance_cents: 10_000,
            payment_status: PaymentStatus::Pending,
            voided: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn sample_lines(document_id: &str) -> Vec<DocumentLine> {
        vec![DocumentLine {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            line_number: 1,
            description: "Cemento Portland x 42.5kg".into(),
            product_code: Some("CEM-425".into()),
            quantity: 5,
            unit_code: "NIU".into(),
            unit_price_cents: 1_695,
            line_total_cents: 8_475,
            igv_cents: 1_525,
            created_at: Utc::now(),
        }]
    }

    /// In-memory database with one tenant and one PENDING document.
    pub async fn setup_document() -> (Database, String) {
        let (db, mut ids) = setup_documents(1).await;
        (db, ids.remove(0))
    }

    /// In-memory database with one tenant and `count` PENDING documents.
    pub async fn setup_documents(count: i64) -> (Database, Vec<String>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let tenant = sample_tenant();
        db.tenants().insert(&tenant).await.unwrap();

        let mut ids = Vec::new();
        for number in 1..=count {
            let doc = sample_document(&tenant.id, number);
            let lines = sample_lines(&doc.id);
            db.documents().insert(&doc, &lines).await.unwrap();
            ids.push(doc.id);
        }

        (db, ids)
    }
}
