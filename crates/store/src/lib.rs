//! Invoice records kept in a local `sled` database.

mod audit;

pub use audit::{AuditEvent, AuditLog, AUDIT_FILE_NAME};

use chrono::{DateTime, Utc};
use nfe_core::document::ItemDetail;
use nfe_core::models::{DocumentModel, Environment};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;

const RECORDS_TREE: &str = "invoices";
const ID_LENGTH: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invoice {0} not found")]
    NotFound(String),
    #[error("storage backend failed: {0}")]
    Backend(#[from] sled::Error),
    #[error("stored record is unreadable: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// One invoice line as it is kept on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub number: u32,
    pub product_code: String,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

impl From<&ItemDetail> for ItemSummary {
    fn from(detail: &ItemDetail) -> Self {
        Self {
            number: detail.number,
            product_code: detail.product.code.clone(),
            description: detail.product.description.clone(),
            quantity: detail.product.quantity,
            unit_price: detail.product.unit_price,
            total: detail.product.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: String,
    /// Subject that issued the invoice; only it may read or cancel it.
    pub owner: String,
    /// Identifier assigned by the fiscal document API.
    pub external_id: String,
    pub status: String,
    pub protocol: Option<String>,
    pub access_key: Option<String>,
    pub model: DocumentModel,
    pub environment: Environment,
    pub reference: String,
    pub items: Vec<ItemSummary>,
    pub total: Decimal,
    pub payload_sha256: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_justification: Option<String>,
}

/// Fields supplied by the caller when a record is first written.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub owner: String,
    pub external_id: String,
    pub status: String,
    pub protocol: Option<String>,
    pub access_key: Option<String>,
    pub model: DocumentModel,
    pub environment: Environment,
    pub reference: String,
    pub items: Vec<ItemSummary>,
    pub total: Decimal,
    pub payload_sha256: String,
}

#[derive(Clone)]
pub struct InvoiceStore {
    db: Db,
}

impl InvoiceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "Invoice store opened");
        Ok(Self { db })
    }

    /// In-memory database removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn records_tree(&self) -> Result<sled::Tree> {
        Ok(self.db.open_tree(RECORDS_TREE)?)
    }

    pub fn insert(&self, new: NewInvoice) -> Result<InvoiceRecord> {
        let records = self.records_tree()?;
        let now = Utc::now();
        let mut id = generate_id();
        while records.contains_key(id.as_bytes())? {
            id = generate_id();
        }

        let rec = InvoiceRecord {
            id: id.clone(),
            owner: new.owner,
            external_id: new.external_id,
            status: new.status,
            protocol: new.protocol,
            access_key: new.access_key,
            model: new.model,
            environment: new.environment,
            reference: new.reference,
            items: new.items,
            total: new.total,
            payload_sha256: new.payload_sha256,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            cancel_justification: None,
        };

        records.insert(id.as_bytes(), serde_json::to_vec(&rec)?)?;
        records.flush()?;
        tracing::debug!(invoice_id = %id, status = %rec.status, "Invoice record stored");
        Ok(rec)
    }

    pub fn get(&self, id: &str) -> Result<InvoiceRecord> {
        let bytes = self
            .records_tree()?
            .get(id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Apply `f` to the stored record and write it back with a fresh
    /// `updated_at`.
    pub fn update<F>(&self, id: &str, f: F) -> Result<InvoiceRecord>
    where
        F: FnOnce(&mut InvoiceRecord),
    {
        let records = self.records_tree()?;
        let key = id.as_bytes();
        let existing = records
            .get(key)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut rec: InvoiceRecord = serde_json::from_slice(&existing)?;
        f(&mut rec);
        rec.id = id.to_string();
        rec.updated_at = Utc::now();
        records.insert(key, serde_json::to_vec(&rec)?)?;
        records.flush()?;
        tracing::debug!(invoice_id = %id, status = %rec.status, "Invoice record updated");
        Ok(rec)
    }

    /// Records owned by `owner`, newest first.
    pub fn list_by_owner(&self, owner: &str) -> Result<Vec<InvoiceRecord>> {
        let mut out = Vec::new();
        for item in self.records_tree()?.iter() {
            let (_k, v) = item?;
            let rec: InvoiceRecord = serde_json::from_slice(&v)?;
            if rec.owner == owner {
                out.push(rec);
            }
        }
        out.sort_by_key(|r| r.created_at);
        out.reverse();
        Ok(out)
    }
}

fn generate_id() -> String {
    use rand::{distributions::Alphanumeric, Rng};
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_invoice(owner: &str, external_id: &str) -> NewInvoice {
        NewInvoice {
            owner: owner.into(),
            external_id: external_id.into(),
            status: "autorizado".into(),
            protocol: Some("135240000000001".into()),
            access_key: None,
            model: DocumentModel::Nfe,
            environment: Environment::Sandbox,
            reference: "ref-1".into(),
            items: vec![ItemSummary {
                number: 1,
                product_code: "P1".into(),
                description: "Produto".into(),
                quantity: dec!(3),
                unit_price: dec!(3.333),
                total: dec!(10.00),
            }],
            total: dec!(10.00),
            payload_sha256: "ab".repeat(32),
        }
    }

    #[test]
    fn insert_then_get_keeps_exact_amounts() {
        let store = InvoiceStore::temporary().unwrap();
        let rec = store.insert(new_invoice("alice", "nfe_1")).unwrap();
        assert_eq!(rec.id.len(), ID_LENGTH);

        let loaded = store.get(&rec.id).unwrap();
        assert_eq!(loaded, rec);
        assert_eq!(loaded.items[0].unit_price, dec!(3.333));
        assert!(loaded.cancelled_at.is_none());
    }

    #[test]
    fn missing_record_is_not_found() {
        let store = InvoiceStore::temporary().unwrap();
        assert!(matches!(store.get("nope"), Err(StoreError::NotFound(id)) if id == "nope"));
        let err = store.update("nope", |r| r.status = "x".into()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn update_applies_closure_and_touches_timestamp() {
        let store = InvoiceStore::temporary().unwrap();
        let rec = store.insert(new_invoice("alice", "nfe_1")).unwrap();

        let updated = store
            .update(&rec.id, |r| {
                r.status = "cancelado".into();
                r.cancel_justification = Some("Pedido cancelado pelo cliente".into());
                r.cancelled_at = Some(Utc::now());
            })
            .unwrap();

        assert_eq!(updated.status, "cancelado");
        assert!(updated.updated_at >= rec.updated_at);
        assert_eq!(updated.created_at, rec.created_at);
        assert_eq!(store.get(&rec.id).unwrap(), updated);
    }

    #[test]
    fn list_is_scoped_to_owner_and_newest_first() {
        let store = InvoiceStore::temporary().unwrap();
        let first = store.insert(new_invoice("alice", "nfe_1")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.insert(new_invoice("alice", "nfe_2")).unwrap();
        store.insert(new_invoice("bob", "nfe_3")).unwrap();

        let listed = store.list_by_owner("alice").unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
        assert!(store.list_by_owner("carol").unwrap().is_empty());
    }

    #[test]
    fn reopened_database_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = InvoiceStore::open(dir.path().join("db")).unwrap();
            store.insert(new_invoice("alice", "nfe_1")).unwrap().id
        };
        let store = InvoiceStore::open(dir.path().join("db")).unwrap();
        assert_eq!(store.get(&id).unwrap().external_id, "nfe_1");
    }
}
