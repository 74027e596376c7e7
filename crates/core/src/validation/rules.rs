use rust_decimal::Decimal;

use crate::builder::{items, parties};
use crate::error::ValidationError;
use crate::models::{Address, InvoiceRequest};
use crate::normalize::{self, digits};
use crate::states;

fn require(errs: &mut Vec<ValidationError>, path: String, value: &str) {
    if value.trim().is_empty() {
        errs.push(ValidationError::missing(path));
    }
}

fn require_digits(errs: &mut Vec<ValidationError>, path: String, value: &str) {
    if digits(value).is_empty() {
        errs.push(ValidationError::missing(path));
    }
}

fn address_checks(errs: &mut Vec<ValidationError>, path: &str, address: &Address) {
    require(errs, format!("{path}.street"), &address.street);
    require(errs, format!("{path}.number"), &address.number);
    require(errs, format!("{path}.neighborhood"), &address.neighborhood);
    require_digits(errs, format!("{path}.municipality_code"), &address.municipality_code);
    require(errs, format!("{path}.municipality_name"), &address.municipality_name);
    require_digits(errs, format!("{path}.postal_code"), &address.postal_code);
    if address.state.trim().is_empty() {
        errs.push(ValidationError::missing(format!("{path}.state")));
    }
}

pub fn header_checks(request: &InvoiceRequest, errs: &mut Vec<ValidationError>) {
    if request.reference.trim().is_empty() {
        errs.push(ValidationError::missing("reference"));
    }
    if request.number == 0 {
        errs.push(ValidationError::new("number", "must be greater than zero"));
    }
    if request.series > 999 {
        errs.push(ValidationError::new("series", "must be between 0 and 999"));
    }
    if request.issued_at.is_none() {
        errs.push(ValidationError::missing("issued_at"));
    }
}

pub fn issuer_checks(request: &InvoiceRequest, errs: &mut Vec<ValidationError>) {
    let issuer = &request.issuer;
    if let Err(e) = parties::tax_identifier("issuer.tax_id", &issuer.tax_id) {
        errs.push(e);
    }
    require(errs, "issuer.legal_name".into(), &issuer.legal_name);
    if issuer.tax_regime.is_none() {
        errs.push(ValidationError::missing("issuer.tax_regime"));
    }
    address_checks(errs, "issuer.address", &issuer.address);
    if !issuer.address.state.trim().is_empty() && states::ibge_code(&issuer.address.state).is_none()
    {
        errs.push(ValidationError::new("issuer.address.state", "unknown UF"));
    }
}

pub fn recipient_checks(request: &InvoiceRequest, errs: &mut Vec<ValidationError>) {
    let Some(recipient) = request.recipient.as_ref() else {
        errs.push(ValidationError::missing("recipient"));
        return;
    };
    if let Err(e) = parties::tax_identifier("recipient.tax_id", &recipient.tax_id) {
        errs.push(e);
    }
    require(errs, "recipient.name".into(), &recipient.name);
    address_checks(errs, "recipient.address", &recipient.address);
}

pub fn item_checks(request: &InvoiceRequest, errs: &mut Vec<ValidationError>) {
    if let Err(e) = items::sequence_numbers(&request.items) {
        errs.push(e);
    }
    for (index, item) in request.items.iter().enumerate() {
        let path = format!("items[{index}]");
        require(errs, format!("{path}.product_code"), &item.product_code);
        require(errs, format!("{path}.description"), &item.description);
        require_digits(errs, format!("{path}.ncm"), &item.ncm);
        require_digits(errs, format!("{path}.cfop"), &item.cfop);
        require(errs, format!("{path}.unit"), &item.unit);
        require(errs, format!("{path}.tax_code"), &item.tax_code);
        if item.quantity <= Decimal::ZERO {
            errs.push(ValidationError::new(
                format!("{path}.quantity"),
                "must be greater than zero",
            ));
        } else if !normalize::fits(item.quantity, normalize::QUANTITY_INTEGER_DIGITS) {
            errs.push(ValidationError::new(
                format!("{path}.quantity"),
                "more than 11 integer digits",
            ));
        }
        if item.unit_price.is_sign_negative() {
            errs.push(ValidationError::new(
                format!("{path}.unit_price"),
                "must not be negative",
            ));
        } else if !normalize::fits(item.unit_price, normalize::UNIT_PRICE_INTEGER_DIGITS) {
            errs.push(ValidationError::new(
                format!("{path}.unit_price"),
                "more than 11 integer digits",
            ));
        }
        if item
            .icms_rate
            .is_some_and(|r| r.is_sign_negative() || r > Decimal::ONE_HUNDRED)
        {
            errs.push(ValidationError::new(
                format!("{path}.icms_rate"),
                "must be between 0 and 100",
            ));
        }
    }
}

pub fn payment_checks(request: &InvoiceRequest, errs: &mut Vec<ValidationError>) {
    let Some(payments) = request.payments.as_ref() else {
        return;
    };
    for (index, line) in payments.iter().enumerate() {
        if line.amount.is_sign_negative() {
            errs.push(ValidationError::new(
                format!("payments[{index}].amount"),
                "must not be negative",
            ));
        } else if !normalize::fits(line.amount, normalize::MONEY_INTEGER_DIGITS) {
            errs.push(ValidationError::new(
                format!("payments[{index}].amount"),
                "more than 13 integer digits",
            ));
        }
    }
}
