//! # UBL Payload Builder
//!
//! Pure transformation from a loaded [`FiscalDocument`] (plus lines and
//! tenant identity) into the nested UBL 2.1 structure the gateway relays to
//! SUNAT. No network, no persistence — given the same document twice, the
//! builder emits the same payload twice.
//!
//! ## Wire Shape
//! The gateway consumes UBL as JSON with `cbc:`/`cac:` keys and
//! `_text`/`_attributes` leaves:
//! ```text
//! "cbc:ID": { "_text": "F001-00000042" }
//! "cbc:TaxAmount": { "_attributes": { "currencyID": "PEN" }, "_text": 18.0 }
//! ```
//!
//! ## Edge-Case Policy
//! - Unit-of-measure codes are normalized against a fixed UN/ECE whitelist;
//!   anything unrecognized falls back to `NIU` (generic unit).
//! - Missing optional fields are OMITTED, never serialized as null.
//! - Missing required identity fields (tenant RUC, counterpart document
//!   number) fail with `ValidationError` before anything is serialized.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{
    CustomerDocType, DocumentLine, DocumentType, FiscalDocument, Shipment, Tenant,
};
use crate::validation::{validate_customer_doc, validate_ruc};

/// Standard IGV rate as a percent, used for the per-line tax category.
const IGV_PERCENT: f64 = crate::IGV_RATE_BPS as f64 / 100.0;

// =============================================================================
// File Name
// =============================================================================

/// Builds the deterministic gateway file name:
/// `{ruc}-{docTypeCode}-{series}-{zero-padded number}`.
///
/// ## Example
/// ```rust
/// use kipu_core::types::DocumentType;
/// use kipu_core::ubl::gateway_file_name;
///
/// assert_eq!(
///     gateway_file_name("20123456789", DocumentType::Factura, "F001", 42),
///     "20123456789-01-F001-00000042"
/// );
/// ```
pub fn gateway_file_name(ruc: &str, doc_type: DocumentType, series: &str, number: i64) -> String {
    format!("{}-{}-{}-{:08}", ruc, doc_type.code(), series, number)
}

// =============================================================================
// Unit Normalization
// =============================================================================

/// UN/ECE rec 20 codes SUNAT accepts without complaint.
const UNIT_WHITELIST: &[&str] = &[
    "NIU", "KGM", "GRM", "LTR", "MTR", "MTK", "MTQ", "BX", "PK", "SET", "CEN", "MIL", "GLL", "ZZ",
];

/// Normalizes a unit-of-measure code to the whitelist, with `NIU` fallback.
///
/// Common Spanish aliases seen in point-of-sale data are mapped first
/// (`UNIDAD` → `NIU`, `KILOS` → `KGM`, ...); anything else not on the
/// whitelist degrades to the generic unit rather than being rejected.
pub fn normalize_unit(raw: &str) -> String {
    let unit = raw.trim().to_uppercase();

    let mapped = match unit.as_str() {
        "" => "NIU",
        "UNIDAD" | "UNIDADES" | "UND" | "UNI" => "NIU",
        "KILOS" | "KILO" | "KG" | "KGS" => "KGM",
        "GRAMOS" | "GR" => "GRM",
        "LITROS" | "LITRO" | "LT" => "LTR",
        "METROS" | "METRO" | "M" => "MTR",
        "CAJA" | "CAJAS" => "BX",
        "PAQUETE" | "PAQ" => "PK",
        "SERVICIO" | "SERV" => "ZZ",
        other => other,
    };

    if UNIT_WHITELIST.contains(&mapped) {
        mapped.to_string()
    } else {
        "NIU".to_string()
    }
}

// =============================================================================
// Leaf Helpers
// =============================================================================

/// `{ "_text": value }`
fn text<T: Serialize>(value: T) -> Value {
    json!({ "_text": value })
}

/// `{ "_attributes": { "currencyID": ... }, "_text": <decimal> }`
///
/// The one place Money leaves integer land — see [`Money::as_decimal`].
fn amount(value: Money, currency: &str) -> Value {
    json!({ "_attributes": { "currencyID": currency }, "_text": value.as_decimal() })
}

/// `{ "_attributes": { "schemeID": ... }, "_text": value }`
fn scheme_id(scheme: &str, value: &str) -> Value {
    json!({ "_attributes": { "schemeID": scheme }, "_text": value })
}

/// Party block shared by supplier/customer roles. Address is optional and
/// omitted when absent.
fn party(scheme: &str, doc_number: &str, name: &str, address: Option<&str>) -> Value {
    let mut legal_entity = json!({
        "cbc:RegistrationName": text(name),
    });
    if let Some(addr) = address {
        legal_entity["cac:RegistrationAddress"] = json!({
            "cac:AddressLine": { "cbc:Line": text(addr) },
        });
    }

    json!({
        "cac:Party": {
            "cac:PartyIdentification": {
                "cbc:ID": scheme_id(scheme, doc_number),
            },
            "cac:PartyLegalEntity": legal_entity,
        }
    })
}

// =============================================================================
// Entry Point
// =============================================================================

/// Builds the full gateway document body for any document type.
///
/// Dispatch guides take the shipment route; everything else is an
/// invoice-family document.
pub fn build_payload(
    doc: &FiscalDocument,
    lines: &[DocumentLine],
    tenant: &Tenant,
) -> Result<Value, ValidationError> {
    match doc.doc_type {
        DocumentType::DespatchGuide => {
            let shipment = doc
                .shipment()
                .map_err(|e| ValidationError::InvalidFormat {
                    field: "shipment".to_string(),
                    reason: e.to_string(),
                })?
                .ok_or_else(|| ValidationError::required("shipment"))?;
            build_despatch_advice(doc, lines, tenant, &shipment)
        }
        _ => build_invoice(doc, lines, tenant),
    }
}

// =============================================================================
// Invoice Family (01 / 03 / 07 / 08)
// =============================================================================

/// Builds an invoice, boleta, or credit/debit note body.
///
/// Credit and debit notes additionally require the referenced document trio
/// and a discrepancy reason; their line and monetary-total element names
/// differ per the UBL schema.
pub fn build_invoice(
    doc: &FiscalDocument,
    lines: &[DocumentLine],
    tenant: &Tenant,
) -> Result<Value, ValidationError> {
    validate_ruc(&tenant.ruc)?;
    validate_customer_doc(doc.customer_doc_type, &doc.customer_doc_number)?;
    if lines.is_empty() {
        return Err(ValidationError::required("lines"));
    }

    let currency = doc.currency.as_str();

    let mut body = json!({
        "cbc:UBLVersionID": text("2.1"),
        "cbc:CustomizationID": text("2.0"),
        "cbc:ID": text(doc.full_number()),
        "cbc:IssueDate": text(doc.issue_date.to_string()),
        "cbc:DocumentCurrencyCode": text(currency),
        "cac:AccountingSupplierParty": party(
            "6",
            &tenant.ruc,
            &tenant.business_name,
            tenant.address.as_deref(),
        ),
        "cac:AccountingCustomerParty": party(
            doc.customer_doc_type.scheme_id(),
            &doc.customer_doc_number,
            &doc.customer_name,
            doc.customer_address.as_deref(),
        ),
        "cac:TaxTotal": tax_total(doc, currency),
    });

    if doc.doc_type.is_note() {
        let (ref_type, ref_series, ref_number) =
            match (doc.ref_doc_type, &doc.ref_series, doc.ref_number) {
                (Some(t), Some(s), Some(n)) => (t, s, n),
                _ => return Err(ValidationError::required("ref_document")),
            };
        let reason_code = doc
            .note_reason_code
            .as_deref()
            .ok_or_else(|| ValidationError::required("note_reason_code"))?;

        let ref_id = format!("{}-{:08}", ref_series, ref_number);
        let mut discrepancy = json!({
            "cbc:ReferenceID": text(&ref_id),
            "cbc:ResponseCode": text(reason_code),
        });
        if let Some(reason) = &doc.note_reason {
            discrepancy["cbc:Description"] = text(reason);
        }

        body["cac:DiscrepancyResponse"] = discrepancy;
        body["cac:BillingReference"] = json!({
            "cac:InvoiceDocumentReference": {
                "cbc:ID": text(&ref_id),
                "cbc:DocumentTypeCode": text(ref_type.code()),
            }
        });
    } else {
        // Only plain invoices/boletas carry a type code element
        body["cbc:InvoiceTypeCode"] = json!({
            "_attributes": { "listID": "0101" },
            "_text": doc.doc_type.code(),
        });
        body["cac:PaymentTerms"] = payment_terms(doc, currency);
    }

    // Line and total element names vary across the invoice family
    let (line_key, qty_key, total_key) = match doc.doc_type {
        DocumentType::CreditNote => (
            "cac:CreditNoteLine",
            "cbc:CreditedQuantity",
            "cac:RequestedMonetaryTotal",
        ),
        DocumentType::DebitNote => (
            "cac:DebitNoteLine",
            "cbc:DebitedQuantity",
            "cac:RequestedMonetaryTotal",
        ),
        _ => (
            "cac:InvoiceLine",
            "cbc:InvoicedQuantity",
            "cac:LegalMonetaryTotal",
        ),
    };

    body[total_key] = json!({
        "cbc:LineExtensionAmount": amount(Money::from_cents(doc.taxable_cents), currency),
        "cbc:TaxInclusiveAmount": amount(doc.total(), currency),
        "cbc:PayableAmount": amount(doc.total(), currency),
    });

    body[line_key] = Value::Array(
        lines
            .iter()
            .enumerate()
            .map(|(idx, line)| invoice_line(idx, line, qty_key, currency))
            .collect(),
    );

    Ok(body)
}

/// Document-level IGV total.
fn tax_total(doc: &FiscalDocument, currency: &str) -> Value {
    let igv = Money::from_cents(doc.igv_cents);
    json!({
        "cbc:TaxAmount": amount(igv, currency),
        "cac:TaxSubtotal": [{
            "cbc:TaxableAmount": amount(Money::from_cents(doc.taxable_cents), currency),
            "cbc:TaxAmount": amount(igv, currency),
            "cac:TaxCategory": {
                "cac:TaxScheme": {
                    "cbc:ID": text("1000"),
                    "cbc:Name": text("IGV"),
                    "cbc:TaxTypeCode": text("VAT"),
                }
            }
        }]
    })
}

/// Payment terms block: cash or credit, plus a detraction entry when one
/// applies. The gateway expects an array even for the single-entry case.
fn payment_terms(doc: &FiscalDocument, currency: &str) -> Value {
    let mut terms = vec![];

    match doc.payment_form {
        crate::types::PaymentForm::Contado => {
            terms.push(json!({
                "cbc:ID": text("FormaPago"),
                "cbc:PaymentMeansID": text("Contado"),
            }));
        }
        crate::types::PaymentForm::Credito => {
            terms.push(json!({
                "cbc:ID": text("FormaPago"),
                "cbc:PaymentMeansID": text("Credito"),
                "cbc:Amount": amount(doc.net_payable(), currency),
            }));
        }
    }

    if doc.detraction_cents > 0 {
        terms.push(json!({
            "cbc:ID": text("Detraccion"),
            "cbc:PaymentMeansID": text("001"),
            "cbc:Amount": amount(doc.detraction(), currency),
        }));
    }

    Value::Array(terms)
}

/// One invoice-family line.
fn invoice_line(idx: usize, line: &DocumentLine, qty_key: &str, currency: &str) -> Value {
    let unit = normalize_unit(&line.unit_code);
    let igv = Money::from_cents(line.igv_cents);
    let line_total = line.line_total();

    // IGV-inclusive unit price for the pricing reference (catalog 16, 01)
    let inclusive_unit = if line.quantity > 0 {
        Money::from_cents((line.line_total_cents + line.igv_cents) / line.quantity)
    } else {
        Money::zero()
    };

    // Taxed lines carry affectation 10 / scheme 1000; exempt lines 20 / 9997
    let tax_category = if line.igv_cents > 0 {
        json!({
            "cbc:Percent": text(IGV_PERCENT),
            "cbc:TaxExemptionReasonCode": text("10"),
            "cac:TaxScheme": {
                "cbc:ID": text("1000"),
                "cbc:Name": text("IGV"),
                "cbc:TaxTypeCode": text("VAT"),
            }
        })
    } else {
        json!({
            "cbc:Percent": text(0.0),
            "cbc:TaxExemptionReasonCode": text("20"),
            "cac:TaxScheme": {
                "cbc:ID": text("9997"),
                "cbc:Name": text("EXO"),
                "cbc:TaxTypeCode": text("VAT"),
            }
        })
    };

    let mut item = json!({
        "cbc:Description": text(&line.description),
    });
    if let Some(code) = &line.product_code {
        item["cac:SellersItemIdentification"] = json!({ "cbc:ID": text(code) });
    }

    let mut value = json!({
        "cbc:ID": text(idx + 1),
        "cbc:LineExtensionAmount": amount(line_total, currency),
        "cac:PricingReference": {
            "cac:AlternativeConditionPrice": {
                "cbc:PriceAmount": amount(inclusive_unit, currency),
                "cbc:PriceTypeCode": text("01"),
            }
        },
        "cac:TaxTotal": {
            "cbc:TaxAmount": amount(igv, currency),
            "cac:TaxSubtotal": [{
                "cbc:TaxableAmount": amount(line_total, currency),
                "cbc:TaxAmount": amount(igv, currency),
                "cac:TaxCategory": tax_category,
            }]
        },
        "cac:Item": item,
        "cac:Price": {
            "cbc:PriceAmount": amount(line.unit_price(), currency),
        },
    });
    value[qty_key] = json!({
        "_attributes": { "unitCode": unit },
        "_text": line.quantity,
    });

    value
}

// =============================================================================
// Despatch Advice (09)
// =============================================================================

/// Builds a dispatch guide (guía de remisión remitente) body.
///
/// Transport mode `01` (public carrier) requires carrier identity; mode `02`
/// (own transport) requires driver document and vehicle plate.
pub fn build_despatch_advice(
    doc: &FiscalDocument,
    lines: &[DocumentLine],
    tenant: &Tenant,
    shipment: &Shipment,
) -> Result<Value, ValidationError> {
    validate_ruc(&tenant.ruc)?;
    validate_customer_doc(doc.customer_doc_type, &doc.customer_doc_number)?;
    if lines.is_empty() {
        return Err(ValidationError::required("lines"));
    }
    validate_transport_mode(shipment)?;

    let body = json!({
        "cbc:UBLVersionID": text("2.1"),
        "cbc:CustomizationID": text("2.0"),
        "cbc:ID": text(doc.full_number()),
        "cbc:IssueDate": text(doc.issue_date.to_string()),
        "cbc:DespatchAdviceTypeCode": text(DocumentType::DespatchGuide.code()),
        "cac:DespatchSupplierParty": party(
            "6",
            &tenant.ruc,
            &tenant.business_name,
            tenant.address.as_deref(),
        ),
        "cac:DeliveryCustomerParty": party(
            doc.customer_doc_type.scheme_id(),
            &doc.customer_doc_number,
            &doc.customer_name,
            None,
        ),
        "cac:Shipment": {
            "cbc:ID": text("SUNAT_Envio"),
            "cbc:HandlingCode": text(&shipment.transfer_reason_code),
            "cbc:GrossWeightMeasure": {
                "_attributes": { "unitCode": normalize_unit(&shipment.weight_unit) },
                "_text": shipment.gross_weight,
            },
            "cac:ShipmentStage": shipment_stage(shipment),
            "cac:Delivery": {
                "cac:DeliveryAddress": {
                    "cbc:ID": text(&shipment.destination_ubigeo),
                    "cac:AddressLine": { "cbc:Line": text(&shipment.destination_address) },
                },
                "cac:Despatch": {
                    "cac:DespatchAddress": {
                        "cbc:ID": text(&shipment.origin_ubigeo),
                        "cac:AddressLine": { "cbc:Line": text(&shipment.origin_address) },
                    }
                }
            }
        },
        "cac:DespatchLine": lines.iter().enumerate().map(|(idx, line)| json!({
            "cbc:ID": text(idx + 1),
            "cbc:DeliveredQuantity": {
                "_attributes": { "unitCode": normalize_unit(&line.unit_code) },
                "_text": line.quantity,
            },
            "cac:OrderLineReference": { "cbc:LineID": text(idx + 1) },
            "cac:Item": { "cbc:Description": text(&line.description) },
        })).collect::<Vec<_>>(),
    });

    Ok(body)
}

/// Mode-dependent required transport fields.
fn validate_transport_mode(shipment: &Shipment) -> Result<(), ValidationError> {
    match shipment.transport_mode.as_str() {
        "01" => {
            if shipment.carrier_ruc.is_none() || shipment.carrier_name.is_none() {
                return Err(ValidationError::required("carrier"));
            }
        }
        "02" => {
            if shipment.driver_doc_number.is_none() || shipment.vehicle_plate.is_none() {
                return Err(ValidationError::required("driver/vehicle"));
            }
        }
        other => {
            return Err(ValidationError::InvalidFormat {
                field: "transport_mode".to_string(),
                reason: format!("unknown mode '{}', expected 01 or 02", other),
            });
        }
    }
    Ok(())
}

/// ShipmentStage block: transport mode, transit start, then carrier data for
/// public transport or driver + vehicle for private transport.
fn shipment_stage(shipment: &Shipment) -> Value {
    let mut stage = json!({
        "cbc:TransportModeCode": text(&shipment.transport_mode),
        "cac:TransitPeriod": {
            "cbc:StartDate": text(shipment.transfer_date.to_string()),
        },
    });

    if shipment.transport_mode == "01" {
        if let (Some(ruc), Some(name)) = (&shipment.carrier_ruc, &shipment.carrier_name) {
            let mut legal_entity = json!({ "cbc:RegistrationName": text(name) });
            if let Some(mtc) = &shipment.carrier_mtc_registry {
                legal_entity["cbc:CompanyID"] = text(mtc);
            }
            stage["cac:CarrierParty"] = json!({
                "cac:PartyIdentification": { "cbc:ID": scheme_id("6", ruc) },
                "cac:PartyLegalEntity": legal_entity,
            });
        }
    }

    if shipment.transport_mode == "02" {
        if let Some(doc_number) = &shipment.driver_doc_number {
            let doc_type = shipment.driver_doc_type.unwrap_or(CustomerDocType::Dni);
            let mut driver = json!({
                "cbc:ID": scheme_id(doc_type.scheme_id(), doc_number),
            });
            if let Some(name) = &shipment.driver_name {
                driver["cbc:FirstName"] = text(name);
            }
            if let Some(license) = &shipment.driver_license {
                driver["cac:IdentityDocumentReference"] = json!({ "cbc:ID": text(license) });
            }
            stage["cac:DriverPerson"] = driver;
        }

        if let Some(plate) = &shipment.vehicle_plate {
            stage["cac:TransportMeans"] = json!({
                "cac:RoadTransport": { "cbc:LicensePlateID": text(plate) },
            });
        }
    }

    stage
}

// =============================================================================
// Unit Tests
// =============================================================================
