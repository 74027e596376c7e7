//! Invoice request models as they arrive from a form or API body.
//!
//! Every field is optional at the serde level so a half-filled form still
//! deserializes; [`crate::validation`] reports what is missing with a field
//! path before the builder runs.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl Environment {
    /// `tpAmb` value.
    pub fn code(self) -> u8 {
        match self {
            Environment::Production => 1,
            Environment::Sandbox => 2,
        }
    }

    /// Environment name used by the fiscal document API.
    pub fn api_name(self) -> &'static str {
        match self {
            Environment::Production => "producao",
            Environment::Sandbox => "homologacao",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentModel {
    /// NF-e, model 55.
    #[default]
    Nfe,
    /// NFC-e, model 65.
    Nfce,
}

impl DocumentModel {
    pub fn code(self) -> u8 {
        match self {
            DocumentModel::Nfe => 55,
            DocumentModel::Nfce => 65,
        }
    }

    /// `tpImp`: portrait DANFE for NF-e, consumer receipt for NFC-e.
    pub fn print_format(self) -> u8 {
        match self {
            DocumentModel::Nfe => 1,
            DocumentModel::Nfce => 4,
        }
    }
}

/// Issuer tax regime (`CRT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TaxRegime {
    /// Simples Nacional.
    Simplified,
    /// Simples Nacional above the gross revenue sublimit.
    SimplifiedExcess,
    /// Regime normal.
    Normal,
}

impl TaxRegime {
    pub fn code(self) -> u8 {
        match self {
            TaxRegime::Simplified => 1,
            TaxRegime::SimplifiedExcess => 2,
            TaxRegime::Normal => 3,
        }
    }

    pub fn is_simplified(self) -> bool {
        matches!(self, TaxRegime::Simplified)
    }
}

impl TryFrom<u8> for TaxRegime {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TaxRegime::Simplified),
            2 => Ok(TaxRegime::SimplifiedExcess),
            3 => Ok(TaxRegime::Normal),
            other => Err(format!("unknown tax regime code {other}")),
        }
    }
}

impl From<TaxRegime> for u8 {
    fn from(value: TaxRegime) -> Self {
        value.code()
    }
}

/// Recipient state-registration indicator (`indIEDest`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RegistrationIndicator {
    Contributor,
    Exempt,
    #[default]
    NonContributor,
}

impl RegistrationIndicator {
    pub fn code(self) -> u8 {
        match self {
            RegistrationIndicator::Contributor => 1,
            RegistrationIndicator::Exempt => 2,
            RegistrationIndicator::NonContributor => 9,
        }
    }
}

impl TryFrom<u8> for RegistrationIndicator {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RegistrationIndicator::Contributor),
            2 => Ok(RegistrationIndicator::Exempt),
            9 => Ok(RegistrationIndicator::NonContributor),
            other => Err(format!("unknown state registration indicator {other}")),
        }
    }
}

impl From<RegistrationIndicator> for u8 {
    fn from(value: RegistrationIndicator) -> Self {
        value.code()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub neighborhood: String,
    pub municipality_code: String,
    pub municipality_name: String,
    /// Two-letter UF.
    pub state: String,
    pub postal_code: String,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerProfile {
    pub tax_id: String,
    pub legal_name: String,
    pub trade_name: Option<String>,
    pub state_registration: Option<String>,
    pub tax_regime: Option<TaxRegime>,
    pub address: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipientProfile {
    pub tax_id: String,
    pub name: String,
    pub address: Address,
    pub email: Option<String>,
    pub registration_indicator: RegistrationIndicator,
    pub state_registration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineItem {
    /// 1-based position; assigned from list order when absent.
    pub number: Option<u32>,
    pub product_code: String,
    pub description: String,
    pub ncm: String,
    pub cest: Option<String>,
    pub cfop: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// CSOSN under the simplified regime, CST otherwise.
    pub tax_code: String,
    pub origin: u8,
    pub icms_rate: Option<Decimal>,
    pub pis_code: Option<String>,
    pub cofins_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentLine {
    /// `tPag` code, see [`PaymentMethod`].
    pub method: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    Check,
    CreditCard,
    DebitCard,
    StoreCredit,
    MealVoucher,
    FoodVoucher,
    GiftVoucher,
    FuelVoucher,
    BankSlip,
    BankDeposit,
    Pix,
    Other,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 13] = [
        PaymentMethod::Cash,
        PaymentMethod::Check,
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
        PaymentMethod::StoreCredit,
        PaymentMethod::MealVoucher,
        PaymentMethod::FoodVoucher,
        PaymentMethod::GiftVoucher,
        PaymentMethod::FuelVoucher,
        PaymentMethod::BankSlip,
        PaymentMethod::BankDeposit,
        PaymentMethod::Pix,
        PaymentMethod::Other,
    ];

    pub fn code(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "01",
            PaymentMethod::Check => "02",
            PaymentMethod::CreditCard => "03",
            PaymentMethod::DebitCard => "04",
            PaymentMethod::StoreCredit => "05",
            PaymentMethod::MealVoucher => "10",
            PaymentMethod::FoodVoucher => "11",
            PaymentMethod::GiftVoucher => "12",
            PaymentMethod::FuelVoucher => "13",
            PaymentMethod::BankSlip => "15",
            PaymentMethod::BankDeposit => "16",
            PaymentMethod::Pix => "17",
            PaymentMethod::Other => "99",
        }
    }

    /// Accepts `"1"` as well as `"01"`.
    pub fn from_code(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let padded = if trimmed.len() == 1 {
            format!("0{trimmed}")
        } else {
            trimmed.to_string()
        };
        Self::ALL.into_iter().find(|m| m.code() == padded)
    }
}

/// Everything needed to build one fiscal document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceRequest {
    pub environment: Environment,
    /// Unique per request; the API uses it for idempotency.
    pub reference: String,
    pub model: DocumentModel,
    pub series: u32,
    pub number: u64,
    pub issued_at: Option<DateTime<FixedOffset>>,
    pub nature_of_operation: String,
    pub issuer: IssuerProfile,
    pub recipient: Option<RecipientProfile>,
    pub items: Vec<LineItem>,
    pub payments: Option<Vec<PaymentLine>>,
    pub additional_info: Option<String>,
}
