//! `InvoiceRequest` -> `BuiltDocument`.
//!
//! Pure and synchronous. Each conditional rule of the schema lives in its
//! own function under [`parties`], [`taxes`], [`items`] and [`payments`] so
//! it can be exercised on its own. Structural problems abort with a
//! [`ValidationError`]; unrecognized codes fall back to a default and are
//! reported as [`Diagnostic`]s.

pub mod items;
pub mod parties;
pub mod payments;
pub mod taxes;

use serde::Serialize;

use crate::document::{
    AdditionalInfo, BuiltDocument, IcmsTotals, Identification, InvoiceInfo, Payment, Totals,
    Transport, SCHEMA_VERSION,
};
use crate::error::ValidationError;
use crate::models::{DocumentModel, InvoiceRequest, RegistrationIndicator};
use crate::normalize::non_blank;
use crate::states;
use crate::validation;

/// Value of `verProc`.
pub const PROCESS_VERSION: &str = concat!("nfe-issuer ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Issuer registration replaced by the exempt literal.
    RegistrationFallback,
    /// Issuer registration present but unusable outside the simplified regime.
    RegistrationDropped,
    UnknownTaxCode,
    UnknownOrigin,
    UnknownContributionCode,
    UnknownPaymentMethod,
}

/// Non-fatal finding produced while building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn warn(&mut self, path: impl Into<String>, kind: DiagnosticKind, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            path: path.into(),
            kind,
            message: message.into(),
        };
        tracing::warn!(path = %diagnostic.path, kind = ?diagnostic.kind, "{}", diagnostic.message);
        self.entries.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }
}

/// Builder output: the document plus whatever fallbacks were applied.
#[derive(Debug, Clone)]
pub struct Built {
    pub document: BuiltDocument,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn build(request: &InvoiceRequest) -> Result<Built, ValidationError> {
    validation::check(request)?;

    let mut diags = Diagnostics::default();

    let recipient_profile = request
        .recipient
        .as_ref()
        .ok_or_else(|| ValidationError::missing("recipient"))?;
    let regime = request
        .issuer
        .tax_regime
        .ok_or_else(|| ValidationError::missing("issuer.tax_regime"))?;
    let issued_at = request
        .issued_at
        .ok_or_else(|| ValidationError::missing("issued_at"))?;

    let issuer = parties::issuer(&request.issuer, &mut diags)?;
    let recipient = parties::recipient(recipient_profile)?;

    let numbers = items::sequence_numbers(&request.items)?;
    let mut details = Vec::with_capacity(request.items.len());
    for (index, (item, number)) in request.items.iter().zip(numbers).enumerate() {
        let path = format!("items[{index}]");
        details.push(items::item_detail(item, number, regime, &path, &mut diags)?);
    }

    let products = items::document_total(&details)?;
    let icms_base = items::sum_money(details.iter().map(|d| d.taxes.icms.value.base()), "items")?;
    let icms_value = items::sum_money(details.iter().map(|d| d.taxes.icms.value.value()), "items")?;

    let payment_lines = payments::payment_lines(request.payments.as_deref(), products, &mut diags);

    let state_code = states::ibge_code(&issuer.address.state)
        .ok_or_else(|| ValidationError::new("issuer.address.state", "unknown UF"))?;

    let identification = Identification {
        state_code,
        nature_of_operation: non_blank(Some(request.nature_of_operation.as_str()))
            .unwrap_or("VENDA")
            .to_string(),
        model: request.model.code(),
        series: request.series,
        number: request.number,
        issued_at: issued_at.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
        operation_type: 1,
        destination: destination(&issuer.address.state, &recipient.address.state),
        municipality_code: issuer.address.municipality_code.clone(),
        print_format: request.model.print_format(),
        emission_type: 1,
        environment: request.environment.code(),
        purpose: 1,
        final_consumer: final_consumer(request.model, recipient_profile.registration_indicator),
        presence: 1,
        emission_process: 0,
        process_version: PROCESS_VERSION.to_string(),
    };

    let document = BuiltDocument {
        environment: request.environment.api_name().to_string(),
        reference: request.reference.trim().to_string(),
        info: InvoiceInfo {
            version: SCHEMA_VERSION.to_string(),
            identification,
            issuer,
            recipient,
            items: details,
            total: Totals {
                icms: IcmsTotals::from_items(products, icms_base, icms_value),
            },
            transport: Transport { freight_mode: 9 },
            payment: Payment {
                lines: payment_lines,
            },
            additional_info: non_blank(request.additional_info.as_deref()).map(|text| {
                AdditionalInfo {
                    complementary: text.to_string(),
                }
            }),
        },
    };

    tracing::debug!(
        reference = %document.reference,
        items = document.info.items.len(),
        total = %products,
        diagnostics = diags.iter().count(),
        "invoice document built"
    );

    Ok(Built {
        document,
        diagnostics: diags.into_vec(),
    })
}

/// `idDest`: 1 internal, 2 interstate, 3 abroad.
pub fn destination(issuer_uf: &str, recipient_uf: &str) -> u8 {
    if recipient_uf.eq_ignore_ascii_case(states::FOREIGN_UF) {
        3
    } else if issuer_uf.eq_ignore_ascii_case(recipient_uf) {
        1
    } else {
        2
    }
}

/// `indFinal`: NFC-e is always a final-consumer sale; for NF-e only
/// non-contributor recipients are.
pub fn final_consumer(model: DocumentModel, indicator: RegistrationIndicator) -> u8 {
    match (model, indicator) {
        (DocumentModel::Nfce, _) => 1,
        (_, RegistrationIndicator::NonContributor) => 1,
        _ => 0,
    }
}
