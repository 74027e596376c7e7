//! Payment breakdown (`pag`).

use rust_decimal::Decimal;

use super::{DiagnosticKind, Diagnostics};
use crate::document::PaymentDetail;
use crate::models::{PaymentLine, PaymentMethod};

/// Payment lines pass through with their amounts untouched. An absent or
/// empty breakdown becomes a single cash line for the document total.
pub fn payment_lines(
    payments: Option<&[PaymentLine]>,
    total: Decimal,
    diags: &mut Diagnostics,
) -> Vec<PaymentDetail> {
    let lines = match payments {
        Some(lines) if !lines.is_empty() => lines,
        _ => {
            return vec![PaymentDetail {
                method: PaymentMethod::Cash.code().to_string(),
                amount: total,
            }]
        }
    };

    lines
        .iter()
        .enumerate()
        .map(|(index, line)| PaymentDetail {
            method: payment_method(&line.method, index, diags).code().to_string(),
            amount: line.amount,
        })
        .collect()
}

pub fn payment_method(raw: &str, index: usize, diags: &mut Diagnostics) -> PaymentMethod {
    PaymentMethod::from_code(raw).unwrap_or_else(|| {
        diags.warn(
            format!("payments[{index}].method"),
            DiagnosticKind::UnknownPaymentMethod,
            format!("payment method {raw:?} not recognized, using 99"),
        );
        PaymentMethod::Other
    })
}
