//! Line items (`det`): sequence numbers, product group and line totals.

use std::collections::BTreeSet;

use rust_decimal::Decimal;

use super::{taxes, Diagnostics};
use crate::document::{ItemDetail, ItemTaxes, Product, NO_GTIN};
use crate::error::ValidationError;
use crate::models::{LineItem, TaxRegime};
use crate::normalize::{self, digits, non_blank};

/// Resolve `nItem` for every item: supplied numbers are kept, missing ones
/// take their 1-based position. The result must be exactly `1..=n`.
pub fn sequence_numbers(items: &[LineItem]) -> Result<Vec<u32>, ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::new("items", "at least one item is required"));
    }

    let mut seen = BTreeSet::new();
    let mut numbers = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let position = u32::try_from(index + 1)
            .map_err(|_| ValidationError::new("items", "too many items"))?;
        let number = item.number.unwrap_or(position);
        let path = format!("items[{index}].number");

        if number == 0 || number as usize > items.len() {
            return Err(ValidationError::new(
                path,
                format!("sequence number {number} outside 1..={}", items.len()),
            ));
        }
        if !seen.insert(number) {
            return Err(ValidationError::new(
                path,
                format!("sequence number {number} is repeated"),
            ));
        }
        numbers.push(number);
    }
    Ok(numbers)
}

/// Quantity times unit price (unit price at 10 places), rounded to cents.
/// A product that does not fit `vProd` is reported at `{path}.quantity`.
pub fn line_total(
    quantity: Decimal,
    unit_price: Decimal,
    path: &str,
) -> Result<Decimal, ValidationError> {
    normalize::unit_price(unit_price)
        .checked_mul(quantity)
        .map(normalize::money)
        .filter(|total| normalize::fits(*total, normalize::MONEY_INTEGER_DIGITS))
        .ok_or_else(|| {
            ValidationError::new(
                format!("{path}.quantity"),
                "line total exceeds the 13 integer digits of vProd",
            )
        })
}

/// `vProd` of the document: sum of the item totals.
pub fn document_total(details: &[ItemDetail]) -> Result<Decimal, ValidationError> {
    sum_money(details.iter().map(|d| d.product.total), "items")
}

/// Checked sum rounded to cents, bounded by the monetary field width.
pub fn sum_money(
    values: impl IntoIterator<Item = Decimal>,
    path: &str,
) -> Result<Decimal, ValidationError> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .map(normalize::money)
        .filter(|total| normalize::fits(*total, normalize::MONEY_INTEGER_DIGITS))
        .ok_or_else(|| ValidationError::new(path, "document total exceeds 13 integer digits"))
}

fn required(path: &str, field: &str, value: &str) -> Result<String, ValidationError> {
    non_blank(Some(value))
        .map(str::to_string)
        .ok_or_else(|| ValidationError::missing(format!("{path}.{field}")))
}

fn required_digits(path: &str, field: &str, value: &str) -> Result<String, ValidationError> {
    let cleaned = digits(value);
    if cleaned.is_empty() {
        return Err(ValidationError::missing(format!("{path}.{field}")));
    }
    Ok(cleaned)
}

pub fn item_detail(
    item: &LineItem,
    number: u32,
    regime: TaxRegime,
    path: &str,
    diags: &mut Diagnostics,
) -> Result<ItemDetail, ValidationError> {
    if item.quantity <= Decimal::ZERO {
        return Err(ValidationError::new(
            format!("{path}.quantity"),
            "must be greater than zero",
        ));
    }
    if item.unit_price.is_sign_negative() {
        return Err(ValidationError::new(
            format!("{path}.unit_price"),
            "must not be negative",
        ));
    }

    let unit = required(path, "unit", &item.unit)?;
    let unit_price = normalize::unit_price(item.unit_price);
    let total = line_total(item.quantity, item.unit_price, path)?;

    let product = Product {
        code: required(path, "product_code", &item.product_code)?,
        gtin: NO_GTIN.to_string(),
        description: required(path, "description", &item.description)?,
        ncm: required_digits(path, "ncm", &item.ncm)?,
        cest: non_blank(item.cest.as_deref())
            .map(digits)
            .filter(|c| !c.is_empty()),
        cfop: required_digits(path, "cfop", &item.cfop)?,
        unit: unit.clone(),
        quantity: item.quantity,
        unit_price,
        total,
        taxable_gtin: NO_GTIN.to_string(),
        taxable_unit: unit,
        taxable_quantity: item.quantity,
        taxable_unit_price: unit_price,
        composes_total: 1,
    };

    let orig = taxes::origin(item.origin, path, diags);
    let item_taxes = ItemTaxes {
        icms: taxes::icms_block(regime, &item.tax_code, orig, item.icms_rate, total, path, diags),
        pis: taxes::contribution_block("PIS", item.pis_code.as_deref(), path, diags),
        cofins: taxes::contribution_block("COFINS", item.cofins_code.as_deref(), path, diags),
    };

    Ok(ItemDetail {
        number,
        product,
        taxes: item_taxes,
    })
}
