//! # Gateway Client
//!
//! Owns the two-phase protocol with the external tax-authority gateway
//! (APISUNAT): submit, then poll-for-status with a bounded number of
//! attempts.
//!
//! ## The Two Phases
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Gateway Exchange                                     │
//! │                                                                         │
//! │  PHASE 1: SUBMIT                                                       │
//! │    POST {base}/personas/v1/sendBill                                    │
//! │    { personaId, personaToken, fileName, documentBody }                 │
//! │         │                                                               │
//! │         ├── no documentId in response ──► Protocol error (retryable)   │
//! │         ├── network/HTTP failure ───────► Transport error (retryable)  │
//! │         └── documentId + status ────────► PHASE 2                      │
//! │                                                                         │
//! │  PHASE 2: BOUNDED POLL (while status == PENDIENTE)                     │
//! │    GET {base}/documents/{id}/getById?data=true   (bearer token)        │
//! │    at most max_poll_attempts times, poll_delay apart                   │
//! │         │                                                               │
//! │         ├── ACEPTADO ──► decision Accepted (xml + cdr + pdf)           │
//! │         ├── EXCEPCION / other ──► decision Rejected (reason)           │
//! │         └── still PENDIENTE ──► decision Pending                       │
//! │                             (scheduler re-polls later — NOT us)        │
//! │                                                                         │
//! │  A poll failure after a successful submit is NOT a submit failure:     │
//! │  the gateway already holds the document. The client reports Pending    │
//! │  and the scheduler picks it up.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The client is explicitly constructed and injected; there is no global
//! instance and no lazy session state.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use kipu_core::GatewayCredentials;

use crate::config::GatewaySettings;
use crate::error::{SunatError, SunatResult};

/// Submit endpoint, relative to the gateway base URL.
pub const SEND_BILL_PATH: &str = "/personas/v1/sendBill";

/// Status-by-id endpoint prefix, relative to the gateway base URL.
pub const DOCUMENTS_PATH: &str = "/documents";

// =============================================================================
// Status Vocabulary
// =============================================================================

/// Gateway status vocabulary, collapsed to the three cases the state machine
/// cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    /// SUNAT has not decided yet.
    Pendiente,
    /// Accepted.
    Aceptado,
    /// EXCEPCION / RECHAZADO / anything unrecognized. Only PENDIENTE keeps a
    /// document in flight, so an unknown status can never wedge it there.
    Rechazado,
}

impl GatewayStatus {
    /// Parses the gateway's status string.
    pub fn parse(raw: &str) -> GatewayStatus {
        match raw.trim().to_uppercase().as_str() {
            "PENDIENTE" => GatewayStatus::Pendiente,
            "ACEPTADO" => GatewayStatus::Aceptado,
            _ => GatewayStatus::Rechazado,
        }
    }
}

// =============================================================================
// Status Response
// =============================================================================

/// One parsed response from the status-by-id endpoint.
#[derive(Debug, Clone)]
pub struct DocumentStatus {
    pub status: GatewayStatus,
    /// The literal status string, kept for logs and stored raw responses.
    pub raw_status: String,
    /// Signed XML, present once accepted.
    pub xml: Option<String>,
    /// CDR zip (base64).
    pub cdr_zip: Option<String>,
    /// Rendered PDF URL (A4 preferred, 80mm fallback).
    pub pdf_url: Option<String>,
    /// Gateway-reported error message for rejections.
    pub error_message: Option<String>,
    /// Full response body.
    pub raw: Value,
}

impl DocumentStatus {
    /// Parses a status response body. A body without a `status` field is a
    /// protocol error — there is nothing safe to do with it.
    pub fn from_value(raw: Value) -> SunatResult<Self> {
        let raw_status = raw
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| SunatError::Protocol("status response missing 'status' field".into()))?
            .to_string();

        let pdf_url = raw
            .get("pdf")
            .and_then(|pdf| pdf.get("A4").or_else(|| pdf.get("80mm")))
            .and_then(Value::as_str)
            .map(String::from);

        Ok(DocumentStatus {
            status: GatewayStatus::parse(&raw_status),
            raw_status,
            xml: raw.get("xml").and_then(Value::as_str).map(String::from),
            cdr_zip: raw.get("cdr").and_then(Value::as_str).map(String::from),
            pdf_url,
            error_message: raw
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(String::from),
            raw,
        })
    }

    /// Human-readable rejection reason, for the operator.
    pub fn rejection_reason(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| format!("Rechazado por SUNAT ({})", self.raw_status))
    }
}

// =============================================================================
// Gateway Report
// =============================================================================

/// The tax authority's position at the end of one submit+poll exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayDecision {
    Accepted,
    Rejected { reason: String },
    /// Still undecided after the bounded poll; the scheduler continues.
    Pending,
}

/// Result of one full submit+poll exchange. The correlation id is always
/// present — without one the exchange failed and no report exists.
#[derive(Debug, Clone)]
pub struct GatewayReport {
    pub document_id: String,
    pub decision: GatewayDecision,
    pub xml: Option<String>,
    pub cdr_zip: Option<String>,
    pub pdf_url: Option<String>,
    /// Raw JSON of the last status response, persisted on the document.
    pub raw_response: Option<String>,
}

// =============================================================================
// Gateway Seam
// =============================================================================

/// The seam between the submission service and the outside world.
///
/// The production implementation is [`GatewayClient`]; tests script this
/// trait to drive the state machine without a network.
#[async_trait]
pub trait DocumentGateway: Send + Sync {
    /// Submit a built document and poll briefly for a decision.
    async fn submit_and_poll(
        &self,
        credentials: &GatewayCredentials,
        file_name: &str,
        document_body: &Value,
    ) -> SunatResult<GatewayReport>;

    /// One status check for an already-submitted document.
    async fn fetch_status(
        &self,
        provider_token: &str,
        document_id: &str,
    ) -> SunatResult<DocumentStatus>;
}

// =============================================================================
// HTTP Client
// =============================================================================

/// HTTP implementation of [`DocumentGateway`] against APISUNAT.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    settings: GatewaySettings,
}

impl GatewayClient {
    /// Builds a client with its own connection pool and per-request timeout.
    pub fn new(settings: GatewaySettings) -> SunatResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| SunatError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(GatewayClient { http, settings })
    }

    /// Phase 1: one POST carrying credentials, the deterministic file name
    /// and the built document. Returns the correlation id and the status the
    /// gateway reported inline (if any).
    async fn submit(
        &self,
        credentials: &GatewayCredentials,
        file_name: &str,
        document_body: &Value,
    ) -> SunatResult<(String, Option<String>)> {
        let url = format!("{}{}", self.settings.base_url, SEND_BILL_PATH);

        let payload = json!({
            "personaId": credentials.provider_id,
            "personaToken": credentials.provider_token,
            "fileName": file_name,
            "documentBody": document_body,
        });

        info!(file_name = %file_name, "Submitting document to gateway");

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;

        // Absence of the correlation id means the response is unusable: we
        // could never poll for this document again.
        let document_id = body
            .get("documentId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SunatError::Protocol("submit response missing documentId".into()))?
            .to_string();

        let status = body.get("status").and_then(Value::as_str).map(String::from);

        Ok((document_id, status))
    }
}

#[async_trait]
impl DocumentGateway for GatewayClient {
    async fn submit_and_poll(
        &self,
        credentials: &GatewayCredentials,
        file_name: &str,
        document_body: &Value,
    ) -> SunatResult<GatewayReport> {
        // Phase 1. Failures here propagate: the document never reached the
        // gateway and IS safe to retry later.
        let (document_id, initial_status) =
            self.submit(credentials, file_name, document_body).await?;

        let mut current = initial_status
            .as_deref()
            .map(GatewayStatus::parse)
            .unwrap_or(GatewayStatus::Pendiente);

        info!(
            document_id = %document_id,
            status = ?initial_status,
            "Document accepted by gateway transport, starting bounded poll"
        );

        // Phase 2: bounded poll. Failures here do NOT propagate — the
        // gateway holds the document, so the worst case is an undecided
        // report the scheduler follows up on.
        let mut last: Option<DocumentStatus> = None;
        let mut attempts = 0u32;

        while current == GatewayStatus::Pendiente && attempts < self.settings.max_poll_attempts {
            sleep(self.settings.poll_delay()).await;
            attempts += 1;

            match self
                .fetch_status(&credentials.provider_token, &document_id)
                .await
            {
                Ok(status) => {
                    debug!(attempt = attempts, status = %status.raw_status, "Poll result");
                    current = status.status;
                    last = Some(status);
                }
                Err(e) => {
                    warn!(
                        document_id = %document_id,
                        error = %e,
                        "Status poll failed, leaving decision to the scheduler"
                    );
                    break;
                }
            }
        }

        // The submit ack itself was terminal and we never fetched artifacts:
        // fetch once so accepted documents carry their XML/CDR.
        if last.is_none() && current != GatewayStatus::Pendiente {
            match self
                .fetch_status(&credentials.provider_token, &document_id)
                .await
            {
                Ok(status) => {
                    current = status.status;
                    last = Some(status);
                }
                Err(e) => {
                    warn!(
                        document_id = %document_id,
                        error = %e,
                        "Could not fetch artifacts for decided document"
                    );
                    current = GatewayStatus::Pendiente;
                }
            }
        }

        Ok(build_report(document_id, current, last))
    }

    async fn fetch_status(
        &self,
        provider_token: &str,
        document_id: &str,
    ) -> SunatResult<DocumentStatus> {
        let url = format!(
            "{}{}/{}/getById?data=true",
            self.settings.base_url, DOCUMENTS_PATH, document_id
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(provider_token)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        DocumentStatus::from_value(body)
    }
}

/// Folds the last known status into the report the state machine consumes.
fn build_report(
    document_id: String,
    current: GatewayStatus,
    last: Option<DocumentStatus>,
) -> GatewayReport {
    let raw_response = last.as_ref().map(|s| s.raw.to_string());

    let decision = match current {
        GatewayStatus::Aceptado => GatewayDecision::Accepted,
        GatewayStatus::Rechazado => GatewayDecision::Rejected {
            reason: last
                .as_ref()
                .map(DocumentStatus::rejection_reason)
                .unwrap_or_else(|| "Rechazado por SUNAT".to_string()),
        },
        GatewayStatus::Pendiente => GatewayDecision::Pending,
    };

    let (xml, cdr_zip, pdf_url) = match last {
        Some(status) => (status.xml, status.cdr_zip, status.pdf_url),
        None => (None, None, None),
    };

    GatewayReport {
        document_id,
        decision,
        xml,
        cdr_zip,
        pdf_url,
        raw_response,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_parse() {
        assert_eq!(GatewayStatus::parse("PENDIENTE"), GatewayStatus::Pendiente);
        assert_eq!(GatewayStatus::parse("aceptado"), GatewayStatus::Aceptado);
        assert_eq!(GatewayStatus::parse("EXCEPCION"), GatewayStatus::Rechazado);
        assert_eq!(GatewayStatus::parse("RECHAZADO"), GatewayStatus::Rechazado);
        // Unknown statuses never keep a document in flight
        assert_eq!(GatewayStatus::parse("???"), GatewayStatus::Rechazado);
    }

    #[test]
    fn test_document_status_parsing() {
        let status = DocumentStatus::from_value(json!({
            "status": "ACEPTADO",
            "xml": "<Invoice/>",
            "cdr": "UEsDBA==",
            "pdf": { "A4": "https://cdn/a4.pdf", "80mm": "https://cdn/ticket.pdf" },
        }))
        .unwrap();

        assert_eq!(status.status, GatewayStatus::Aceptado);
        assert_eq!(status.xml.as_deref(), Some("<Invoice/>"));
        assert_eq!(status.pdf_url.as_deref(), Some("https://cdn/a4.pdf"));
    }

    #[test]
    fn test_pdf_falls_back_to_ticket_format() {
        let status = DocumentStatus::from_value(json!({
            "status": "ACEPTADO",
            "pdf": { "80mm": "https://cdn/ticket.pdf" },
        }))
        .unwrap();

        assert_eq!(status.pdf_url.as_deref(), Some("https://cdn/ticket.pdf"));
    }

    #[test]
    fn test_missing_status_is_protocol_error() {
        let err = DocumentStatus::from_value(json!({ "xml": "<Invoice/>" })).unwrap_err();
        assert!(matches!(err, SunatError::Protocol(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_rejection_reason_extraction() {
        let status = DocumentStatus::from_value(json!({
            "status": "EXCEPCION",
            "error": { "message": "RUC del adquiriente no existe" },
        }))
        .unwrap();

        assert_eq!(status.rejection_reason(), "RUC del adquiriente no existe");

        let status = DocumentStatus::from_value(json!({ "status": "EXCEPCION" })).unwrap();
        assert_eq!(status.rejection_reason(), "Rechazado por SUNAT (EXCEPCION)");
    }

    #[test]
    fn test_build_report_decisions() {
        let accepted_status = DocumentStatus::from_value(json!({
            "status": "ACEPTADO",
            "xml": "<Invoice/>",
        }))
        .unwrap();
        let report = build_report("ext-1".into(), GatewayStatus::Aceptado, Some(accepted_status));
        assert_eq!(report.decision, GatewayDecision::Accepted);
        assert_eq!(report.xml.as_deref(), Some("<Invoice/>"));
        assert!(report.raw_response.is_some());

        let report = build_report("ext-2".into(), GatewayStatus::Pendiente, None);
        assert_eq!(report.decision, GatewayDecision::Pending);
        assert!(report.xml.is_none());

        let report = build_report("ext-3".into(), GatewayStatus::Rechazado, None);
        assert!(matches!(report.decision, GatewayDecision::Rejected { .. }));
    }
}
