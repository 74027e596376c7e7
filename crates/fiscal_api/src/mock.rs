use super::{
    is_authorized, ApiError, DocumentRef, FiscalDocumentApi, Transmission, AUTHORIZED_STATUS,
    CANCELLED_STATUS,
};
use anyhow::Context;
use async_trait::async_trait;
use nfe_core::BuiltDocument;
use rand::{distributions::Alphanumeric, Rng};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Duration};

const DOCUMENTS_TREE: &str = "mock_documents";

/// Where the mock keeps what it issued.
enum Documents {
    Memory(RwLock<HashMap<String, Transmission>>),
    /// Survives restarts, so a later process can query or cancel.
    Sled(sled::Tree),
}

impl Documents {
    async fn get(&self, id: &str) -> Result<Option<Transmission>, ApiError> {
        match self {
            Documents::Memory(map) => Ok(map.read().await.get(id).cloned()),
            Documents::Sled(tree) => {
                let Some(bytes) = tree.get(id).context("read mock document")? else {
                    return Ok(None);
                };
                let doc = serde_json::from_slice(&bytes).context("decode mock document")?;
                Ok(Some(doc))
            }
        }
    }

    async fn put(&self, doc: &Transmission) -> Result<(), ApiError> {
        match self {
            Documents::Memory(map) => {
                map.write().await.insert(doc.id.clone(), doc.clone());
            }
            Documents::Sled(tree) => {
                let bytes = serde_json::to_vec(doc).context("encode mock document")?;
                tree.insert(doc.id.as_bytes(), bytes)
                    .context("write mock document")?;
                tree.flush_async().await.context("flush mock documents")?;
            }
        }
        Ok(())
    }
}

/// Fiscal API stand-in. Issued documents get the configured status
/// (authorized by default); tests can move a document to any status.
pub struct MockFiscalApi {
    issue_status: String,
    latency: Duration,
    documents: Documents,
    // serializes read-modify-write of a document
    write_lock: Mutex<()>,
    cancel_calls: AtomicUsize,
}

impl Default for MockFiscalApi {
    fn default() -> Self {
        Self {
            issue_status: AUTHORIZED_STATUS.to_string(),
            latency: Duration::ZERO,
            documents: Documents::Memory(RwLock::new(HashMap::new())),
            write_lock: Mutex::new(()),
            cancel_calls: AtomicUsize::new(0),
        }
    }
}

fn random_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn random_digits(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

impl MockFiscalApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_issue_status(status: &str) -> Arc<Self> {
        Arc::new(Self {
            issue_status: status.to_string(),
            ..Self::default()
        })
    }

    /// Mock whose documents live in a sled database at `path`.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("Failed to open mock API database {}", path.display()))?;
        let tree = db.open_tree(DOCUMENTS_TREE)?;
        Ok(Self {
            documents: Documents::Sled(tree),
            ..Self::default()
        })
    }

    /// Simulate network latency on every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn set_status(&self, id: &str, status: &str) {
        let _guard = self.write_lock.lock().await;
        if let Ok(Some(mut doc)) = self.documents.get(id).await {
            doc.status = status.to_string();
            if let Err(e) = self.documents.put(&doc).await {
                tracing::warn!(%id, error = %e, "Failed to update mock document");
            }
        }
    }

    /// Number of cancellation requests that reached the API.
    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl FiscalDocumentApi for MockFiscalApi {
    async fn issue(&self, document: &BuiltDocument) -> Result<Transmission, ApiError> {
        self.simulate_latency().await;

        let id = format!("nfe_{}", random_id(16));
        let authorized = is_authorized(&self.issue_status);
        let transmission = Transmission {
            id,
            status: self.issue_status.clone(),
            protocol: authorized.then(|| random_digits(15)),
            access_key: authorized.then(|| random_digits(44)),
            message: Some("Mock authorization".to_string()),
            raw: serde_json::to_value(document).ok(),
        };
        self.documents.put(&transmission).await?;
        Ok(transmission)
    }

    async fn status(&self, document: &DocumentRef) -> Result<Transmission, ApiError> {
        self.simulate_latency().await;
        self.documents
            .get(&document.id)
            .await?
            .ok_or_else(|| ApiError::NotFound(document.id.clone()))
    }

    async fn cancel(
        &self,
        document: &DocumentRef,
        _justification: &str,
    ) -> Result<Transmission, ApiError> {
        self.simulate_latency().await;
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);

        let _guard = self.write_lock.lock().await;
        let mut doc = self
            .documents
            .get(&document.id)
            .await?
            .ok_or_else(|| ApiError::NotFound(document.id.clone()))?;
        if !is_authorized(&doc.status) {
            return Err(ApiError::Upstream {
                status: 400,
                code: Some("InvalidStatus".to_string()),
                message: format!("document is {}", doc.status),
            });
        }
        doc.status = CANCELLED_STATUS.to_string();
        doc.protocol = Some(random_digits(15));
        doc.message = Some("Mock cancellation".to_string());
        self.documents.put(&doc).await?;
        Ok(doc)
    }
}
