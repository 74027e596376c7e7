//! Digit cleaning and rounding shared by the builder rules.

use rust_decimal::{Decimal, RoundingStrategy};

/// Literal the schema expects for an exempt state registration.
pub const EXEMPT_REGISTRATION: &str = "ISENTO";

/// Fractional digits carried for unit prices.
pub const UNIT_PRICE_SCALE: u32 = 10;

/// Fractional digits carried for monetary totals.
pub const MONEY_SCALE: u32 = 2;

/// Integer digits allowed by the schema: `qCom` 11.4, `vUnCom` 11.10,
/// monetary values 13.2.
pub const QUANTITY_INTEGER_DIGITS: u32 = 11;
pub const UNIT_PRICE_INTEGER_DIGITS: u32 = 11;
pub const MONEY_INTEGER_DIGITS: u32 = 13;

pub fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Trimmed value, `None` when blank.
pub fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Accepts the schema literal as well as its English spelling, any case.
pub fn is_exempt_literal(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.eq_ignore_ascii_case(EXEMPT_REGISTRATION) || trimmed.eq_ignore_ascii_case("EXEMPT")
}

/// Digits of a fixed-width code, left-padded with zeros (`"0"` -> `"00"`).
pub fn code(raw: &str, width: usize) -> String {
    let cleaned = digits(raw);
    if cleaned.is_empty() || cleaned.len() >= width {
        cleaned
    } else {
        format!("{cleaned:0>width$}")
    }
}

pub fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn unit_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(UNIT_PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Whether the integer part of `value` has at most `integer_digits` digits.
pub fn fits(value: Decimal, integer_digits: u32) -> bool {
    value.abs().trunc() < Decimal::from(10_i64.pow(integer_digits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn digits_strips_punctuation() {
        assert_eq!(digits("12.345.678/0001-95"), "12345678000195");
        assert_eq!(digits("01310-100"), "01310100");
        assert_eq!(digits("ISENTO"), "");
    }

    #[test]
    fn exempt_literal_is_case_insensitive() {
        assert!(is_exempt_literal("isento"));
        assert!(is_exempt_literal(" Exempt "));
        assert!(!is_exempt_literal("123"));
    }

    #[test]
    fn code_pads_short_values() {
        assert_eq!(code("0", 2), "00");
        assert_eq!(code("7", 2), "07");
        assert_eq!(code("102", 3), "102");
        assert_eq!(code("", 2), "");
    }

    #[test]
    fn money_rounds_half_away_from_zero() {
        assert_eq!(money(dec!(10.005)), dec!(10.01));
        assert_eq!(money(dec!(10.004)), dec!(10.00));
        assert_eq!(unit_price(dec!(1.123456789049)), dec!(1.1234567890));
    }

    #[test]
    fn fits_counts_integer_digits_only() {
        assert!(fits(dec!(99999999999.9999), QUANTITY_INTEGER_DIGITS));
        assert!(!fits(dec!(100000000000), QUANTITY_INTEGER_DIGITS));
        assert!(fits(dec!(-9999999999999.99), MONEY_INTEGER_DIGITS));
        assert!(!fits(dec!(10000000000000), MONEY_INTEGER_DIGITS));
    }
}
