//! Per-item ICMS and PIS/COFINS groups.

use rust_decimal::Decimal;

use super::{DiagnosticKind, Diagnostics};
use crate::document::{
    ContributionBlock, IcmsBlock, Keyed, RelievedIcms, SimplifiedIcms, TaxedIcms,
};
use crate::models::TaxRegime;
use crate::normalize::{self, non_blank};

pub const KNOWN_CSOSN: [&str; 10] = [
    "101", "102", "103", "201", "202", "203", "300", "400", "500", "900",
];
pub const FALLBACK_CSOSN: &str = "102";

pub const KNOWN_CST: [&str; 11] = [
    "00", "10", "20", "30", "40", "41", "50", "51", "60", "70", "90",
];
pub const FALLBACK_CST: &str = "90";

/// Exempt, not taxed, suspended, charged earlier by substitution.
pub const RELIEVED_CST: [&str; 4] = ["40", "41", "50", "60"];

/// `motDesICMS` 9: other reasons.
pub const RELIEF_REASON_OTHER: u8 = 9;

/// `modBC` 3: operation value.
pub const BASE_MODE_OPERATION_VALUE: u8 = 3;

/// PIS/COFINS situation codes without amounts (`PISNT`/`COFINSNT`).
pub const NOT_TAXED_CONTRIBUTION: [&str; 6] = ["04", "05", "06", "07", "08", "09"];

/// Exempt operation.
pub const DEFAULT_CONTRIBUTION: &str = "07";

pub const MAX_ORIGIN: u8 = 8;

/// Product origin, 0 (domestic) when outside the table.
pub fn origin(raw: u8, path: &str, diags: &mut Diagnostics) -> u8 {
    if raw <= MAX_ORIGIN {
        return raw;
    }
    diags.warn(
        format!("{path}.origin"),
        DiagnosticKind::UnknownOrigin,
        format!("origin {raw} is not in 0-{MAX_ORIGIN}, using 0"),
    );
    0
}

fn resolve_code(
    raw: &str,
    width: usize,
    known: &[&str],
    fallback: &str,
    path: &str,
    diags: &mut Diagnostics,
) -> String {
    let code = normalize::code(raw, width);
    if known.contains(&code.as_str()) {
        return code;
    }
    diags.warn(
        format!("{path}.tax_code"),
        DiagnosticKind::UnknownTaxCode,
        format!("tax situation code {raw:?} not recognized, using {fallback}"),
    );
    fallback.to_string()
}

pub fn icms_value(base: Decimal, rate: Decimal) -> Decimal {
    normalize::money(base * rate / Decimal::ONE_HUNDRED)
}

/// ICMS group keyed by the situation code.
///
/// The simplified regime carries only origin and CSOSN. Other regimes get
/// zero base and value for the relieved CSTs and a rate-based value for the
/// rest.
pub fn icms_block(
    regime: TaxRegime,
    tax_code: &str,
    orig: u8,
    rate: Option<Decimal>,
    line_total: Decimal,
    path: &str,
    diags: &mut Diagnostics,
) -> Keyed<IcmsBlock> {
    if regime.is_simplified() {
        let csosn = resolve_code(tax_code, 3, &KNOWN_CSOSN, FALLBACK_CSOSN, path, diags);
        return Keyed::new(
            format!("ICMSSN{csosn}"),
            IcmsBlock::Simplified(SimplifiedIcms { orig, csosn }),
        );
    }

    let cst = resolve_code(tax_code, 2, &KNOWN_CST, FALLBACK_CST, path, diags);
    let key = format!("ICMS{cst}");

    if RELIEVED_CST.contains(&cst.as_str()) {
        return Keyed::new(
            key,
            IcmsBlock::Relieved(RelievedIcms {
                orig,
                cst,
                base: Decimal::ZERO,
                value: Decimal::ZERO,
                relief_reason: RELIEF_REASON_OTHER,
            }),
        );
    }

    let rate = rate.unwrap_or(Decimal::ZERO);
    let base = normalize::money(line_total);
    Keyed::new(
        key,
        IcmsBlock::Taxed(TaxedIcms {
            orig,
            cst,
            base_mode: BASE_MODE_OPERATION_VALUE,
            base,
            rate,
            value: icms_value(base, rate),
        }),
    )
}

/// Situation code for PIS or COFINS; anything outside the not-taxed set
/// becomes the exempt-operation code.
pub fn contribution_code(raw: Option<&str>) -> &'static str {
    let Some(value) = non_blank(raw) else {
        return DEFAULT_CONTRIBUTION;
    };
    let code = normalize::code(value, 2);
    NOT_TAXED_CONTRIBUTION
        .into_iter()
        .find(|known| *known == code)
        .unwrap_or(DEFAULT_CONTRIBUTION)
}

/// `PISNT`/`COFINSNT` group. `tax` is `"PIS"` or `"COFINS"`.
pub fn contribution_block(
    tax: &str,
    raw: Option<&str>,
    path: &str,
    diags: &mut Diagnostics,
) -> Keyed<ContributionBlock> {
    let cst = contribution_code(raw);
    if let Some(value) = non_blank(raw) {
        if normalize::code(value, 2) != cst {
            diags.warn(
                format!("{path}.{}_code", tax.to_ascii_lowercase()),
                DiagnosticKind::UnknownContributionCode,
                format!("{tax} situation code {value:?} not supported, using {cst}"),
            );
        }
    }
    Keyed::new(
        format!("{tax}NT"),
        ContributionBlock {
            cst: cst.to_string(),
        },
    )
}
