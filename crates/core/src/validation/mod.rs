//! Structural checks run once at the boundary, before the builder.
//!
//! `validate` reports every problem found so a form can highlight all of
//! them; `check` stops at the first for callers that only need a verdict.

mod rules;

use crate::error::ValidationError;
use crate::models::InvoiceRequest;

pub fn validate(request: &InvoiceRequest) -> Result<(), Vec<ValidationError>> {
    let mut errs = Vec::new();
    rules::header_checks(request, &mut errs);
    rules::issuer_checks(request, &mut errs);
    rules::recipient_checks(request, &mut errs);
    rules::item_checks(request, &mut errs);
    rules::payment_checks(request, &mut errs);
    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}

pub fn check(request: &InvoiceRequest) -> Result<(), ValidationError> {
    match validate(request) {
        Ok(()) => Ok(()),
        Err(errs) => Err(errs
            .into_iter()
            .next()
            .unwrap_or_else(|| ValidationError::new("request", "invalid"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineItem, PaymentLine};
    use rust_decimal_macros::dec;

    #[test]
    fn empty_request_reports_every_missing_field() {
        let errs = validate(&InvoiceRequest::default()).unwrap_err();
        let paths: Vec<_> = errs.iter().map(|e| e.path.as_str()).collect();
        for expected in [
            "reference",
            "number",
            "issued_at",
            "issuer.tax_id",
            "issuer.legal_name",
            "issuer.tax_regime",
            "issuer.address.street",
            "recipient",
            "items",
        ] {
            assert!(paths.contains(&expected), "missing {expected} in {paths:?}");
        }
        assert_eq!(check(&InvoiceRequest::default()).unwrap_err().path, "reference");
    }

    #[test]
    fn item_and_payment_amounts_are_checked() {
        let request = InvoiceRequest {
            items: vec![LineItem {
                quantity: dec!(-1),
                unit_price: dec!(-2),
                ..Default::default()
            }],
            payments: Some(vec![PaymentLine {
                method: "01".into(),
                amount: dec!(-5),
            }]),
            ..Default::default()
        };
        let errs = validate(&request).unwrap_err();
        let paths: Vec<_> = errs.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"items[0].quantity"));
        assert!(paths.contains(&"items[0].unit_price"));
        assert!(paths.contains(&"items[0].ncm"));
        assert!(paths.contains(&"payments[0].amount"));
    }

    #[test]
    fn amounts_wider_than_the_schema_are_rejected() {
        let request = InvoiceRequest {
            items: vec![LineItem {
                quantity: dec!(100000000000000000000),
                unit_price: dec!(100000000000),
                icms_rate: Some(dec!(1000)),
                ..Default::default()
            }],
            payments: Some(vec![PaymentLine {
                method: "01".into(),
                amount: dec!(10000000000000),
            }]),
            ..Default::default()
        };
        let errs = validate(&request).unwrap_err();
        let paths: Vec<_> = errs.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"items[0].quantity"));
        assert!(paths.contains(&"items[0].unit_price"));
        assert!(paths.contains(&"items[0].icms_rate"));
        assert!(paths.contains(&"payments[0].amount"));
    }
}
