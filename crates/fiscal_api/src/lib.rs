use async_trait::async_trait;
use nfe_core::models::DocumentModel;
use nfe_core::BuiltDocument;
use serde::{Deserialize, Serialize};

/// Upstream status that allows cancellation.
pub const AUTHORIZED_STATUS: &str = "autorizado";

/// Status recorded once a cancellation event is accepted.
pub const CANCELLED_STATUS: &str = "cancelado";

/// Minimum length of a cancellation justification, in characters.
pub const MIN_JUSTIFICATION_CHARS: usize = 15;

/// Result of an issuance, status query or cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    /// Identifier assigned by the fiscal document API.
    pub id: String,
    /// Upstream status, kept opaque (`autorizado`, `rejeitado`, `processando`...).
    pub status: String,
    /// Authorization or cancellation protocol, once the authority answered.
    pub protocol: Option<String>,
    pub access_key: Option<String>,
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl Transmission {
    pub fn is_authorized(&self) -> bool {
        is_authorized(&self.status)
    }
}

pub fn is_authorized(status: &str) -> bool {
    status.trim().eq_ignore_ascii_case(AUTHORIZED_STATUS)
}

/// Address of a document already known to the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub model: DocumentModel,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>, model: DocumentModel) -> Self {
        Self {
            id: id.into(),
            model,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The API answered with an error; status and code are kept as received.
    #[error("fiscal API returned {status}: {message}")]
    Upstream {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("fiscal document {0} not found upstream")]
    NotFound(String),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

#[async_trait]
pub trait FiscalDocumentApi: Send + Sync {
    async fn issue(&self, document: &BuiltDocument) -> Result<Transmission, ApiError>;
    async fn status(&self, document: &DocumentRef) -> Result<Transmission, ApiError>;
    async fn cancel(
        &self,
        document: &DocumentRef,
        justification: &str,
    ) -> Result<Transmission, ApiError>;
}

pub mod http;
pub mod mock;
