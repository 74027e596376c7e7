//! Schema-shaped NF-e document (layout 4.00) as accepted by the fiscal
//! document API.
//!
//! Optional groups use `skip_serializing_if` so a field the rules omit is
//! absent from the JSON, never `null`. Monetary values serialize as JSON
//! numbers.

use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Layout version of the fiscal schema in force.
pub const SCHEMA_VERSION: &str = "4.00";

/// Placeholder the schema requires when a product has no barcode.
pub const NO_GTIN: &str = "SEM GTIN";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltDocument {
    #[serde(rename = "ambiente")]
    pub environment: String,
    #[serde(rename = "referencia")]
    pub reference: String,
    #[serde(rename = "infNFe")]
    pub info: InvoiceInfo,
}

impl BuiltDocument {
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Document total (`vNF`).
    pub fn total(&self) -> Decimal {
        self.info.total.icms.invoice_total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceInfo {
    #[serde(rename = "versao")]
    pub version: String,
    #[serde(rename = "ide")]
    pub identification: Identification,
    #[serde(rename = "emit")]
    pub issuer: Issuer,
    #[serde(rename = "dest")]
    pub recipient: Recipient,
    #[serde(rename = "det")]
    pub items: Vec<ItemDetail>,
    pub total: Totals,
    #[serde(rename = "transp")]
    pub transport: Transport,
    #[serde(rename = "pag")]
    pub payment: Payment,
    #[serde(rename = "infAdic", skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<AdditionalInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identification {
    #[serde(rename = "cUF")]
    pub state_code: u8,
    #[serde(rename = "natOp")]
    pub nature_of_operation: String,
    #[serde(rename = "mod")]
    pub model: u8,
    #[serde(rename = "serie")]
    pub series: u32,
    #[serde(rename = "nNF")]
    pub number: u64,
    #[serde(rename = "dhEmi")]
    pub issued_at: String,
    /// 0 = inbound, 1 = outbound.
    #[serde(rename = "tpNF")]
    pub operation_type: u8,
    /// 1 = same state, 2 = interstate, 3 = abroad.
    #[serde(rename = "idDest")]
    pub destination: u8,
    #[serde(rename = "cMunFG")]
    pub municipality_code: String,
    #[serde(rename = "tpImp")]
    pub print_format: u8,
    #[serde(rename = "tpEmis")]
    pub emission_type: u8,
    #[serde(rename = "tpAmb")]
    pub environment: u8,
    #[serde(rename = "finNFe")]
    pub purpose: u8,
    #[serde(rename = "indFinal")]
    pub final_consumer: u8,
    #[serde(rename = "indPres")]
    pub presence: u8,
    #[serde(rename = "procEmi")]
    pub emission_process: u8,
    #[serde(rename = "verProc")]
    pub process_version: String,
}

/// Exactly one of `CPF`/`CNPJ` ends up in the flattened party object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TaxIdentifier {
    #[serde(rename = "CPF")]
    Cpf(String),
    #[serde(rename = "CNPJ")]
    Cnpj(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressBlock {
    #[serde(rename = "xLgr")]
    pub street: String,
    #[serde(rename = "nro")]
    pub number: String,
    #[serde(rename = "xCpl", skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
    #[serde(rename = "xBairro")]
    pub neighborhood: String,
    #[serde(rename = "cMun")]
    pub municipality_code: String,
    #[serde(rename = "xMun")]
    pub municipality_name: String,
    #[serde(rename = "UF")]
    pub state: String,
    #[serde(rename = "CEP")]
    pub postal_code: String,
    #[serde(rename = "cPais")]
    pub country_code: String,
    #[serde(rename = "xPais")]
    pub country_name: String,
    #[serde(rename = "fone", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issuer {
    #[serde(flatten)]
    pub id: TaxIdentifier,
    #[serde(rename = "xNome")]
    pub legal_name: String,
    #[serde(rename = "xFant", skip_serializing_if = "Option::is_none")]
    pub trade_name: Option<String>,
    #[serde(rename = "enderEmit")]
    pub address: AddressBlock,
    #[serde(rename = "IE", skip_serializing_if = "Option::is_none")]
    pub state_registration: Option<String>,
    #[serde(rename = "CRT")]
    pub tax_regime: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    #[serde(flatten)]
    pub id: TaxIdentifier,
    #[serde(rename = "xNome")]
    pub name: String,
    #[serde(rename = "enderDest")]
    pub address: AddressBlock,
    #[serde(rename = "indIEDest")]
    pub registration_indicator: u8,
    #[serde(rename = "IE", skip_serializing_if = "Option::is_none")]
    pub state_registration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDetail {
    #[serde(rename = "nItem")]
    pub number: u32,
    #[serde(rename = "prod")]
    pub product: Product,
    #[serde(rename = "imposto")]
    pub taxes: ItemTaxes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    #[serde(rename = "cProd")]
    pub code: String,
    #[serde(rename = "cEAN")]
    pub gtin: String,
    #[serde(rename = "xProd")]
    pub description: String,
    #[serde(rename = "NCM")]
    pub ncm: String,
    #[serde(rename = "CEST", skip_serializing_if = "Option::is_none")]
    pub cest: Option<String>,
    #[serde(rename = "CFOP")]
    pub cfop: String,
    #[serde(rename = "uCom")]
    pub unit: String,
    #[serde(rename = "qCom", with = "rust_decimal::serde::arbitrary_precision")]
    pub quantity: Decimal,
    #[serde(rename = "vUnCom", with = "rust_decimal::serde::arbitrary_precision")]
    pub unit_price: Decimal,
    #[serde(rename = "vProd", with = "rust_decimal::serde::arbitrary_precision")]
    pub total: Decimal,
    #[serde(rename = "cEANTrib")]
    pub taxable_gtin: String,
    #[serde(rename = "uTrib")]
    pub taxable_unit: String,
    #[serde(rename = "qTrib", with = "rust_decimal::serde::arbitrary_precision")]
    pub taxable_quantity: Decimal,
    #[serde(rename = "vUnTrib", with = "rust_decimal::serde::arbitrary_precision")]
    pub taxable_unit_price: Decimal,
    /// 1 = line value composes the document total.
    #[serde(rename = "indTot")]
    pub composes_total: u8,
}

/// A tax group whose JSON key carries the situation code, e.g.
/// `{"ICMSSN102": {...}}` or `{"PISNT": {...}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyed<T> {
    pub key: String,
    pub value: T,
}

impl<T> Keyed<T> {
    pub fn new(key: impl Into<String>, value: T) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl<T: Serialize> Serialize for Keyed<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.key, &self.value)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemTaxes {
    #[serde(rename = "ICMS")]
    pub icms: Keyed<IcmsBlock>,
    #[serde(rename = "PIS")]
    pub pis: Keyed<ContributionBlock>,
    #[serde(rename = "COFINS")]
    pub cofins: Keyed<ContributionBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IcmsBlock {
    Simplified(SimplifiedIcms),
    Relieved(RelievedIcms),
    Taxed(TaxedIcms),
}

impl IcmsBlock {
    pub fn base(&self) -> Decimal {
        match self {
            IcmsBlock::Simplified(_) => Decimal::ZERO,
            IcmsBlock::Relieved(b) => b.base,
            IcmsBlock::Taxed(b) => b.base,
        }
    }

    pub fn value(&self) -> Decimal {
        match self {
            IcmsBlock::Simplified(_) => Decimal::ZERO,
            IcmsBlock::Relieved(b) => b.value,
            IcmsBlock::Taxed(b) => b.value,
        }
    }
}

/// Simples Nacional group; the CSOSN fixes the treatment, no amounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimplifiedIcms {
    pub orig: u8,
    #[serde(rename = "CSOSN")]
    pub csosn: String,
}

/// Exempt, not taxed, suspended or previously charged (CST 40/41/50/60).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelievedIcms {
    pub orig: u8,
    #[serde(rename = "CST")]
    pub cst: String,
    #[serde(rename = "vBC", with = "rust_decimal::serde::arbitrary_precision")]
    pub base: Decimal,
    #[serde(rename = "vICMS", with = "rust_decimal::serde::arbitrary_precision")]
    pub value: Decimal,
    #[serde(rename = "motDesICMS")]
    pub relief_reason: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxedIcms {
    pub orig: u8,
    #[serde(rename = "CST")]
    pub cst: String,
    /// 3 = base is the operation value.
    #[serde(rename = "modBC")]
    pub base_mode: u8,
    #[serde(rename = "vBC", with = "rust_decimal::serde::arbitrary_precision")]
    pub base: Decimal,
    #[serde(rename = "pICMS", with = "rust_decimal::serde::arbitrary_precision")]
    pub rate: Decimal,
    #[serde(rename = "vICMS", with = "rust_decimal::serde::arbitrary_precision")]
    pub value: Decimal,
}

/// PIS/COFINS group for situation codes that carry no amounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContributionBlock {
    #[serde(rename = "CST")]
    pub cst: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    #[serde(rename = "ICMSTot")]
    pub icms: IcmsTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IcmsTotals {
    #[serde(rename = "vBC", with = "rust_decimal::serde::arbitrary_precision")]
    pub base: Decimal,
    #[serde(rename = "vICMS", with = "rust_decimal::serde::arbitrary_precision")]
    pub icms: Decimal,
    #[serde(rename = "vICMSDeson", with = "rust_decimal::serde::arbitrary_precision")]
    pub icms_relieved: Decimal,
    #[serde(rename = "vFCP", with = "rust_decimal::serde::arbitrary_precision")]
    pub poverty_fund: Decimal,
    #[serde(rename = "vBCST", with = "rust_decimal::serde::arbitrary_precision")]
    pub st_base: Decimal,
    #[serde(rename = "vST", with = "rust_decimal::serde::arbitrary_precision")]
    pub st: Decimal,
    #[serde(rename = "vFCPST", with = "rust_decimal::serde::arbitrary_precision")]
    pub st_poverty_fund: Decimal,
    #[serde(rename = "vFCPSTRet", with = "rust_decimal::serde::arbitrary_precision")]
    pub st_poverty_fund_withheld: Decimal,
    #[serde(rename = "vProd", with = "rust_decimal::serde::arbitrary_precision")]
    pub products: Decimal,
    #[serde(rename = "vFrete", with = "rust_decimal::serde::arbitrary_precision")]
    pub freight: Decimal,
    #[serde(rename = "vSeg", with = "rust_decimal::serde::arbitrary_precision")]
    pub insurance: Decimal,
    #[serde(rename = "vDesc", with = "rust_decimal::serde::arbitrary_precision")]
    pub discount: Decimal,
    #[serde(rename = "vII", with = "rust_decimal::serde::arbitrary_precision")]
    pub import_tax: Decimal,
    #[serde(rename = "vIPI", with = "rust_decimal::serde::arbitrary_precision")]
    pub ipi: Decimal,
    #[serde(rename = "vIPIDevol", with = "rust_decimal::serde::arbitrary_precision")]
    pub ipi_returned: Decimal,
    #[serde(rename = "vPIS", with = "rust_decimal::serde::arbitrary_precision")]
    pub pis: Decimal,
    #[serde(rename = "vCOFINS", with = "rust_decimal::serde::arbitrary_precision")]
    pub cofins: Decimal,
    #[serde(rename = "vOutro", with = "rust_decimal::serde::arbitrary_precision")]
    pub other: Decimal,
    #[serde(rename = "vNF", with = "rust_decimal::serde::arbitrary_precision")]
    pub invoice_total: Decimal,
}

impl IcmsTotals {
    /// Totals for a document with no freight, insurance, discounts or
    /// substitution amounts.
    pub fn from_items(products: Decimal, base: Decimal, icms: Decimal) -> Self {
        Self {
            base,
            icms,
            icms_relieved: Decimal::ZERO,
            poverty_fund: Decimal::ZERO,
            st_base: Decimal::ZERO,
            st: Decimal::ZERO,
            st_poverty_fund: Decimal::ZERO,
            st_poverty_fund_withheld: Decimal::ZERO,
            products,
            freight: Decimal::ZERO,
            insurance: Decimal::ZERO,
            discount: Decimal::ZERO,
            import_tax: Decimal::ZERO,
            ipi: Decimal::ZERO,
            ipi_returned: Decimal::ZERO,
            pis: Decimal::ZERO,
            cofins: Decimal::ZERO,
            other: Decimal::ZERO,
            invoice_total: products,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transport {
    /// 9 = no freight.
    #[serde(rename = "modFrete")]
    pub freight_mode: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    #[serde(rename = "detPag")]
    pub lines: Vec<PaymentDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentDetail {
    #[serde(rename = "tPag")]
    pub method: String,
    #[serde(rename = "vPag", with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdditionalInfo {
    #[serde(rename = "infCpl")]
    pub complementary: String,
}
