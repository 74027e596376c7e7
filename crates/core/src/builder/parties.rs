//! Issuer (`emit`) and recipient (`dest`) groups.

use super::{DiagnosticKind, Diagnostics};
use crate::document::{AddressBlock, Issuer, Recipient, TaxIdentifier};
use crate::error::{FieldPath, ValidationError};
use crate::models::{Address, IssuerProfile, RecipientProfile, RegistrationIndicator, TaxRegime};
use crate::normalize::{digits, is_exempt_literal, non_blank, EXEMPT_REGISTRATION};

pub const CPF_LEN: usize = 11;
pub const CNPJ_LEN: usize = 14;

const DEFAULT_COUNTRY_CODE: &str = "1058";
const DEFAULT_COUNTRY_NAME: &str = "BRASIL";

/// Cleaned 11 digits select `CPF`, 14 select `CNPJ`; anything else is rejected.
pub fn tax_identifier(path: &str, raw: &str) -> Result<TaxIdentifier, ValidationError> {
    let cleaned = digits(raw);
    match cleaned.len() {
        0 => Err(ValidationError::missing(path)),
        CPF_LEN => Ok(TaxIdentifier::Cpf(cleaned)),
        CNPJ_LEN => Ok(TaxIdentifier::Cnpj(cleaned)),
        n => Err(ValidationError::new(
            path,
            format!("expected {CPF_LEN} (CPF) or {CNPJ_LEN} (CNPJ) digits, got {n}"),
        )),
    }
}

/// Registration cleaned to digits when it is 2–14 digits long.
fn usable_registration(raw: &str) -> Option<String> {
    let cleaned = digits(raw);
    (2..=14).contains(&cleaned.len()).then_some(cleaned)
}

/// Issuer `IE`.
///
/// Under the simplified regime the group is mandatory and falls back to
/// `ISENTO`. Under the other regimes it is emitted only for a usable value.
pub fn issuer_registration(
    regime: TaxRegime,
    raw: Option<&str>,
    diags: &mut Diagnostics,
) -> Option<String> {
    const PATH: &str = "issuer.state_registration";
    let value = non_blank(raw);

    if regime.is_simplified() {
        let Some(value) = value else {
            diags.warn(
                PATH,
                DiagnosticKind::RegistrationFallback,
                "state registration missing under simplified regime, using ISENTO",
            );
            return Some(EXEMPT_REGISTRATION.to_string());
        };
        if is_exempt_literal(value) {
            return Some(EXEMPT_REGISTRATION.to_string());
        }
        return match usable_registration(value) {
            Some(cleaned) => Some(cleaned),
            None => {
                diags.warn(
                    PATH,
                    DiagnosticKind::RegistrationFallback,
                    format!("state registration {value:?} is not 2-14 digits, using ISENTO"),
                );
                Some(EXEMPT_REGISTRATION.to_string())
            }
        };
    }

    let value = value?;
    let cleaned = usable_registration(value);
    if cleaned.is_none() {
        diags.warn(
            PATH,
            DiagnosticKind::RegistrationDropped,
            format!("state registration {value:?} is not 2-14 digits, omitting IE"),
        );
    }
    cleaned
}

/// Recipient `IE`, driven by the registration indicator.
pub fn recipient_registration(indicator: RegistrationIndicator, raw: Option<&str>) -> Option<String> {
    let value = non_blank(raw)?;
    if indicator == RegistrationIndicator::Exempt && is_exempt_literal(value) {
        return Some(EXEMPT_REGISTRATION.to_string());
    }
    let cleaned = digits(value);
    (!cleaned.is_empty()).then_some(cleaned)
}

fn required(path: &FieldPath<'_>, field: &str, value: &str) -> Result<String, ValidationError> {
    non_blank(Some(value))
        .map(str::to_string)
        .ok_or_else(|| ValidationError::missing(path.join(field)))
}

fn required_digits(path: &FieldPath<'_>, field: &str, value: &str) -> Result<String, ValidationError> {
    let cleaned = digits(value);
    if cleaned.is_empty() {
        return Err(ValidationError::missing(path.join(field)));
    }
    Ok(cleaned)
}

pub fn address_block(path: &str, address: &Address) -> Result<AddressBlock, ValidationError> {
    let path = FieldPath::new(path);
    Ok(AddressBlock {
        street: required(&path, "street", &address.street)?,
        number: required(&path, "number", &address.number)?,
        complement: non_blank(address.complement.as_deref()).map(str::to_string),
        neighborhood: required(&path, "neighborhood", &address.neighborhood)?,
        municipality_code: required_digits(&path, "municipality_code", &address.municipality_code)?,
        municipality_name: required(&path, "municipality_name", &address.municipality_name)?,
        state: required(&path, "state", &address.state)?.to_ascii_uppercase(),
        postal_code: required_digits(&path, "postal_code", &address.postal_code)?,
        country_code: non_blank(address.country_code.as_deref())
            .map(digits)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_COUNTRY_CODE.to_string()),
        country_name: non_blank(address.country_name.as_deref())
            .unwrap_or(DEFAULT_COUNTRY_NAME)
            .to_string(),
        phone: non_blank(address.phone.as_deref())
            .map(digits)
            .filter(|p| !p.is_empty()),
    })
}

pub fn issuer(profile: &IssuerProfile, diags: &mut Diagnostics) -> Result<Issuer, ValidationError> {
    let regime = profile
        .tax_regime
        .ok_or_else(|| ValidationError::missing("issuer.tax_regime"))?;
    let path = FieldPath::new("issuer");

    Ok(Issuer {
        id: tax_identifier("issuer.tax_id", &profile.tax_id)?,
        legal_name: required(&path, "legal_name", &profile.legal_name)?,
        trade_name: non_blank(profile.trade_name.as_deref()).map(str::to_string),
        address: address_block("issuer.address", &profile.address)?,
        state_registration: issuer_registration(
            regime,
            profile.state_registration.as_deref(),
            diags,
        ),
        tax_regime: regime.code(),
    })
}

pub fn recipient(profile: &RecipientProfile) -> Result<Recipient, ValidationError> {
    let path = FieldPath::new("recipient");

    Ok(Recipient {
        id: tax_identifier("recipient.tax_id", &profile.tax_id)?,
        name: required(&path, "name", &profile.name)?,
        address: address_block("recipient.address", &profile.address)?,
        registration_indicator: profile.registration_indicator.code(),
        state_registration: recipient_registration(
            profile.registration_indicator,
            profile.state_registration.as_deref(),
        ),
        email: non_blank(profile.email.as_deref()).map(str::to_string),
    })
}
