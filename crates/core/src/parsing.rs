use sha2::{Digest, Sha256};

use crate::document::BuiltDocument;
use crate::error::ValidationError;
use crate::models::InvoiceRequest;

pub fn compute_sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of the exact bytes that are transmitted.
pub fn document_digest(document: &BuiltDocument) -> serde_json::Result<String> {
    Ok(compute_sha256_hex(&document.to_json_bytes()?))
}

/// Parse a request body. Malformed JSON or a wrongly typed field is a
/// validation failure located at `body`.
pub fn parse_invoice_request(json: &str) -> Result<InvoiceRequest, ValidationError> {
    serde_json::from_str(json).map_err(|e| ValidationError::new("body", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RegistrationIndicator, TaxRegime};
    use rust_decimal_macros::dec;

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            compute_sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn parses_loosely_filled_body() {
        let body = r#"{
            "reference": "ref-1",
            "number": 10,
            "issuer": { "tax_id": "12.345.678/0001-95", "tax_regime": 1 },
            "recipient": { "tax_id": "123.456.789-01", "registration_indicator": 9 },
            "items": [
                { "description": "Caneta", "quantity": "2", "unit_price": 1.5 }
            ]
        }"#;
        let request = parse_invoice_request(body).unwrap();
        assert_eq!(request.issuer.tax_regime, Some(TaxRegime::Simplified));
        let recipient = request.recipient.unwrap();
        assert_eq!(recipient.registration_indicator, RegistrationIndicator::NonContributor);
        assert_eq!(request.items[0].quantity, dec!(2));
        assert_eq!(request.items[0].unit_price, dec!(1.5));
        assert!(request.payments.is_none());
    }

    #[test]
    fn unknown_regime_is_a_body_error() {
        let body = r#"{ "issuer": { "tax_regime": 7 } }"#;
        let err = parse_invoice_request(body).unwrap_err();
        assert_eq!(err.path, "body");
        assert!(err.message.contains("tax regime"));
    }
}
