//! # Domain Types
//!
//! Core domain types used throughout Kipu.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌─────────────────┐      │
//! │  │     Tenant      │   │  FiscalDocument  │   │    Payment      │      │
//! │  │  ─────────────  │   │  ──────────────  │   │  ─────────────  │      │
//! │  │  id (UUID)      │   │  id (UUID)       │   │  id (UUID)      │      │
//! │  │  ruc            │   │  series + number │   │  document_id    │      │
//! │  │  provider creds │   │  totals (cents)  │   │  amount_cents   │      │
//! │  └─────────────────┘   │  submission_state│   │  method         │      │
//! │                        │  balance + status│   └─────────────────┘      │
//! │                        └──────────────────┘                            │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  DocumentType   │   │  PaymentStatus  │   │ PaymentMethod   │       │
//! │  │  01/03/07/08/09 │   │  Pending        │   │  Cash, Card,    │       │
//! │  │  (SUNAT codes)  │   │  Partial        │   │  Transfer, Yape │       │
//! │  └─────────────────┘   │  Completed      │   │  Plin, Other    │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every document has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: `(tenant, doc_type, series, number)` - what SUNAT sees

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::submission::SubmissionState;

// =============================================================================
// Document Type
// =============================================================================

/// SUNAT document type (catálogo 01).
///
/// The wire code is the persisted representation — the same string SUNAT
/// expects in the file name and in `InvoiceTypeCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
pub enum DocumentType {
    /// Factura electrónica (01) - issued to RUC holders.
    #[serde(rename = "01")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "01"))]
    Factura,
    /// Boleta de venta (03) - issued to consumers.
    #[serde(rename = "03")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "03"))]
    Boleta,
    /// Nota de crédito (07) - reduces a referenced document.
    #[serde(rename = "07")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "07"))]
    CreditNote,
    /// Nota de débito (08) - increases a referenced document.
    #[serde(rename = "08")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "08"))]
    DebitNote,
    /// Guía de remisión remitente (09) - dispatch guide.
    #[serde(rename = "09")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "09"))]
    DespatchGuide,
}

impl DocumentType {
    /// Returns the two-digit SUNAT code.
    pub const fn code(&self) -> &'static str {
        match self {
            DocumentType::Factura => "01",
            DocumentType::Boleta => "03",
            DocumentType::CreditNote => "07",
            DocumentType::DebitNote => "08",
            DocumentType::DespatchGuide => "09",
        }
    }

    /// True for credit/debit notes, which must reference another document.
    pub const fn is_note(&self) -> bool {
        matches!(self, DocumentType::CreditNote | DocumentType::DebitNote)
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// Customer Document Type
// =============================================================================

/// Identity document type of the counterpart (catálogo 06).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
pub enum CustomerDocType {
    /// Sin documento (0) - anonymous consumer on boletas under threshold.
    #[serde(rename = "0")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "0"))]
    None,
    /// DNI (1).
    #[serde(rename = "1")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "1"))]
    Dni,
    /// Carnet de extranjería (4).
    #[serde(rename = "4")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "4"))]
    ForeignerCard,
    /// RUC (6).
    #[serde(rename = "6")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "6"))]
    Ruc,
    /// Pasaporte (7).
    #[serde(rename = "7")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "7"))]
    Passport,
}

impl CustomerDocType {
    /// Returns the catalog 06 scheme id used in party identification.
    pub const fn scheme_id(&self) -> &'static str {
        match self {
            CustomerDocType::None => "0",
            CustomerDocType::Dni => "1",
            CustomerDocType::ForeignerCard => "4",
            CustomerDocType::Ruc => "6",
            CustomerDocType::Passport => "7",
        }
    }
}

// =============================================================================
// Payment Enums
// =============================================================================

/// How the document is to be collected (forma de pago).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentForm {
    /// Paid in full at issue time.
    Contado,
    /// Collected over time; the balance decrements as payments register.
    Credito,
}

/// Means of payment for a single ledger entry (medio de pago).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Card,
    Yape,
    Plin,
    Other,
}

/// Collection status of a document, derived from its outstanding balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Nothing collected yet.
    Pending,
    /// Some payments registered, balance still positive.
    Partial,
    /// Balance reached exactly zero.
    Completed,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

// =============================================================================
// Tenant
// =============================================================================

/// A business account. Owns documents and holds gateway credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Tenant {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Legal business name (razón social).
    pub business_name: String,

    /// 11-digit tax id (RUC).
    pub ruc: String,

    /// Fiscal address printed on documents.
    pub address: Option<String>,

    /// Gateway account id (personaId). Required for submission.
    pub provider_id: Option<String>,

    /// Gateway bearer token (personaToken). Required for submission.
    pub provider_token: Option<String>,

    /// Whether the tenant is active (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Returns the gateway credentials, or `None` if either half is missing.
    ///
    /// A document cannot be submitted without both halves configured.
    pub fn credentials(&self) -> Option<GatewayCredentials> {
        match (&self.provider_id, &self.provider_token) {
            (Some(id), Some(token)) if !id.is_empty() && !token.is_empty() => {
                Some(GatewayCredentials {
                    provider_id: id.clone(),
                    provider_token: token.clone(),
                })
            }
            _ => None,
        }
    }
}

/// Credentials for the tax gateway, always carried as a pair.
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub provider_id: String,
    pub provider_token: String,
}

// =============================================================================
// Fiscal Document
// =============================================================================

/// An invoice, credit/debit note or dispatch guide subject to SUNAT
/// submission.
///
/// ## Two Independent Lifecycles
/// ```text
/// submission_state:  PENDING → SUBMITTED → ACCEPTED / REJECTED
///                        └──── SUBMIT_FAILED ⟲ (scheduled retries)
///
/// payment_status:    PENDING → PARTIAL → COMPLETED
///                    (moves only through the payment ledger)
/// ```
/// The two never gate each other: money can be collected while SUNAT is
/// still deciding, and an accepted document may stay unpaid for months.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FiscalDocument {
    pub id: String,
    pub tenant_id: String,
    pub doc_type: DocumentType,

    /// Series (e.g. `F001`). Unique with `number` per tenant and type.
    pub series: String,
    /// Correlative number within the series.
    pub number: i64,

    /// ISO currency code (`PEN` unless stated otherwise).
    pub currency: String,
    pub issue_date: NaiveDate,

    // Counterpart identity
    pub customer_doc_type: CustomerDocType,
    pub customer_doc_number: String,
    pub customer_name: String,
    pub customer_address: Option<String>,

    // Monetary totals, all in céntimos
    pub taxable_cents: i64,
    pub igv_cents: i64,
    pub total_cents: i64,
    /// Mandatory detraction/withholding deduction (0 when none applies).
    pub detraction_cents: i64,

    pub payment_form: PaymentForm,

    // Referenced document (credit/debit notes only)
    pub ref_doc_type: Option<DocumentType>,
    pub ref_series: Option<String>,
    pub ref_number: Option<i64>,
    /// Catalog 09/10 reason code for notes (e.g. `01` = annulment).
    pub note_reason_code: Option<String>,
    pub note_reason: Option<String>,

    /// Serialized [`Shipment`] for dispatch guides (09), absent otherwise.
    pub shipment_json: Option<String>,

    // Submission tracking
    pub submission_state: SubmissionState,
    /// Correlation id assigned by the gateway on a successful submit.
    pub gateway_document_id: Option<String>,
    /// Signed XML returned by the gateway once accepted.
    pub sunat_xml: Option<String>,
    /// CDR (constancia de recepción) zip, base64 as returned.
    pub sunat_cdr_zip: Option<String>,
    /// Raw JSON of the last gateway status response.
    pub sunat_cdr_response: Option<String>,
    /// Rendered PDF URL if the gateway produced one.
    pub sunat_pdf_url: Option<String>,
    /// Last submission/rejection error, shown to the operator.
    pub sunat_error_msg: Option<String>,
    /// Failed submission attempts so far.
    pub retries_count: i64,
    /// Earliest instant the retry job may pick this document up again.
    pub next_retry_at: Option<DateTime<Utc>>,

    // Payment tracking
    pub balance_cents: i64,
    pub payment_status: PaymentStatus,

    /// Operator annulment. A voided document accepts no further payments.
    pub voided: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FiscalDocument {
    /// Returns the grand total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Returns the detraction amount as Money.
    #[inline]
    pub fn detraction(&self) -> Money {
        Money::from_cents(self.detraction_cents)
    }

    /// Returns the outstanding balance as Money.
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }

    /// The amount actually collectible: total minus detraction, never
    /// negative.
    pub fn net_payable(&self) -> Money {
        self.total().saturating_sub_floor(self.detraction())
    }

    /// Business identifier as SUNAT displays it, e.g. `F001-00000042`.
    pub fn full_number(&self) -> String {
        format!("{}-{:08}", self.series, self.number)
    }

    /// Deserializes the shipment block for dispatch guides.
    pub fn shipment(&self) -> Result<Option<Shipment>, serde_json::Error> {
        match &self.shipment_json {
            Some(raw) => serde_json::from_str(raw).map(Some),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Document Line
// =============================================================================

/// A line item on a fiscal document.
/// Descriptions and prices are frozen at issue time (snapshot pattern).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DocumentLine {
    pub id: String,
    pub document_id: String,
    /// 1-based position within the document.
    pub line_number: i64,
    pub description: String,
    pub product_code: Option<String>,
    pub quantity: i64,
    /// UN/ECE rec 20 unit code (normalized by the payload builder).
    pub unit_code: String,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub igv_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl DocumentLine {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A payment towards a document's outstanding balance.
/// A document can accumulate many partial payments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: String,
    pub document_id: String,
    pub tenant_id: String,
    /// Amount in céntimos, always positive.
    pub amount_cents: i64,
    pub method: PaymentMethod,
    /// External reference (operation number, voucher id).
    pub reference: Option<String>,
    pub note: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Shipment (dispatch guides)
// =============================================================================

/// Transport metadata carried by dispatch guides (09).
///
/// Stored as a JSON column on the document; the payload builder is the only
/// consumer. Mode `01` is public transport (carrier data required), mode
/// `02` is private transport (driver + vehicle required).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    /// `01` public carrier / `02` own transport.
    pub transport_mode: String,
    /// Date the goods start moving.
    pub transfer_date: NaiveDate,
    /// Reason for transfer (catalog 20), e.g. `01` sale.
    pub transfer_reason_code: String,
    /// Total gross weight.
    pub gross_weight: f64,
    /// Unit for the gross weight, `KGM` in practice.
    #[serde(default = "default_weight_unit")]
    pub weight_unit: String,

    // Public transport (mode 01)
    pub carrier_ruc: Option<String>,
    pub carrier_name: Option<String>,
    pub carrier_mtc_registry: Option<String>,

    // Private transport (mode 02)
    pub driver_doc_type: Option<CustomerDocType>,
    pub driver_doc_number: Option<String>,
    pub driver_name: Option<String>,
    pub driver_license: Option<String>,
    pub vehicle_plate: Option<String>,

    // Route
    pub origin_ubigeo: String,
    pub origin_address: String,
    pub destination_ubigeo: String,
    pub destination_address: String,
}

fn default_weight_unit() -> String {
    "KGM".to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
