//! # Validation Module
//!
//! Identity-field validation shared by the payload builder and the service
//! layer. Database constraints (NOT NULL, UNIQUE) remain the last line of
//! defense; these checks exist so a malformed document fails before any
//! network or persistence work happens.

use crate::error::ValidationError;
use crate::types::CustomerDocType;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Tax Id (RUC)
// =============================================================================

/// Validates a RUC (Registro Único de Contribuyentes).
///
/// ## Rules
/// - Exactly 11 digits
/// - First two digits identify the taxpayer class (10 natural, 20 company)
///
/// ## Example
/// ```rust
/// use kipu_core::validation::validate_ruc;
///
/// assert!(validate_ruc("20123456789").is_ok());
/// assert!(validate_ruc("").is_err());
/// assert!(validate_ruc("123").is_err());
/// ```
pub fn validate_ruc(ruc: &str) -> ValidationResult<()> {
    let ruc = ruc.trim();

    if ruc.is_empty() {
        return Err(ValidationError::required("ruc"));
    }

    if ruc.len() != 11 || !ruc.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "ruc".to_string(),
            reason: "must be exactly 11 digits".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Series
// =============================================================================

/// Validates a document series (e.g. `F001`, `B001`, `T001`).
///
/// ## Rules
/// - Exactly 4 characters
/// - Leading letter, followed by 3 alphanumerics
pub fn validate_series(series: &str) -> ValidationResult<()> {
    let series = series.trim();

    if series.is_empty() {
        return Err(ValidationError::required("series"));
    }

    let mut chars = series.chars();
    let leading_letter = chars.next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false);

    if series.len() != 4 || !leading_letter || !chars.all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "series".to_string(),
            reason: "must be a letter followed by 3 alphanumerics (e.g. F001)".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Counterpart Identity
// =============================================================================

/// Validates the counterpart's identity document number against its type.
///
/// ## Rules
/// - `None` (catalog 0): number may be empty — anonymous consumer boletas
/// - `Dni`: exactly 8 digits
/// - `Ruc`: exactly 11 digits
/// - other types: non-empty, at most 15 characters
pub fn validate_customer_doc(
    doc_type: CustomerDocType,
    number: &str,
) -> ValidationResult<()> {
    let number = number.trim();

    if doc_type == CustomerDocType::None {
        return Ok(());
    }

    if number.is_empty() {
        return Err(ValidationError::required("customer_doc_number"));
    }

    match doc_type {
        CustomerDocType::Dni if number.len() != 8 || !number.chars().all(|c| c.is_ascii_digit()) => {
            Err(ValidationError::InvalidFormat {
                field: "customer_doc_number".to_string(),
                reason: "DNI must be exactly 8 digits".to_string(),
            })
        }
        CustomerDocType::Ruc if number.len() != 11 || !number.chars().all(|c| c.is_ascii_digit()) => {
            Err(ValidationError::InvalidFormat {
                field: "customer_doc_number".to_string(),
                reason: "RUC must be exactly 11 digits".to_string(),
            })
        }
        _ if number.len() > 15 => Err(ValidationError::TooLong {
            field: "customer_doc_number".to_string(),
            max: 15,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ruc() {
        assert!(validate_ruc("20123456789").is_ok());
        assert!(validate_ruc("10456789012").is_ok());

        assert!(matches!(
            validate_ruc(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_ruc("2012345678"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validate_ruc("20123A56789"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_validate_series() {
        assert!(validate_series("F001").is_ok());
        assert!(validate_series("B010").is_ok());
        assert!(validate_series("T001").is_ok());

        assert!(validate_series("").is_err());
        assert!(validate_series("0001").is_err());
        assert!(validate_series("F0001").is_err());
    }

    #[test]
    fn test_validate_customer_doc() {
        assert!(validate_customer_doc(CustomerDocType::Dni, "12345678").is_ok());
        assert!(validate_customer_doc(CustomerDocType::Ruc, "20123456789").is_ok());
        assert!(validate_customer_doc(CustomerDocType::Passport, "PE1234567").is_ok());

        // Anonymous consumer needs no number
        assert!(validate_customer_doc(CustomerDocType::None, "").is_ok());

        assert!(matches!(
            validate_customer_doc(CustomerDocType::Dni, ""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_customer_doc(CustomerDocType::Dni, "1234"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validate_customer_doc(CustomerDocType::Ruc, "123"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }
}
