use super::{ApiError, DocumentRef, FiscalDocumentApi, Transmission, CANCELLED_STATUS};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use nfe_core::models::DocumentModel;
use nfe_core::BuiltDocument;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Refresh the token this long before the server says it expires.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Clone)]
pub struct HttpFiscalApi {
    pub base_url: String,
    pub auth: ApiAuth,
    http_client: reqwest::Client,
    access_token: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
pub enum ApiAuth {
    ApiKey {
        key: String,
    },
    OAuth2 {
        client_id: String,
        client_secret: String,
        token_url: String,
        scope: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Debug, Serialize)]
struct OAuth2TokenRequest<'a> {
    grant_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct OAuth2TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Serialize)]
struct CancelRequest<'a> {
    justificativa: &'a str,
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    id: String,
    status: String,
    #[serde(default)]
    autorizacao: Option<AuthorizationEvent>,
}

#[derive(Debug, Deserialize)]
struct AuthorizationEvent {
    numero_protocolo: Option<String>,
    chave_acesso: Option<String>,
    motivo_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancellationResponse {
    id: String,
    status: String,
    numero_protocolo: Option<String>,
    motivo_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

fn model_path(model: DocumentModel) -> &'static str {
    match model {
        DocumentModel::Nfe => "nfe",
        DocumentModel::Nfce => "nfce",
    }
}

fn document_model(document: &BuiltDocument) -> DocumentModel {
    if document.info.identification.model == DocumentModel::Nfce.code() {
        DocumentModel::Nfce
    } else {
        DocumentModel::Nfe
    }
}

/// Keep the upstream status and error code; fall back to the raw body when
/// it is not the usual error envelope.
async fn upstream_error(resp: reqwest::Response) -> ApiError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(env) => ApiError::Upstream {
            status,
            code: env.error.code,
            message: env.error.message.unwrap_or(body),
        },
        Err(_) => ApiError::Upstream {
            status,
            code: None,
            message: body,
        },
    }
}

impl HttpFiscalApi {
    pub fn new(base_url: String, auth: ApiAuth, timeout: Duration) -> anyhow::Result<Arc<Self>> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Arc::new(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            http_client,
            access_token: Arc::new(RwLock::new(None)),
        }))
    }

    async fn get_auth_header(&self) -> Result<String, ApiError> {
        match &self.auth {
            ApiAuth::ApiKey { key } => Ok(format!("Bearer {}", key)),
            ApiAuth::OAuth2 {
                client_id,
                client_secret,
                token_url,
                scope,
            } => {
                // Check if we have a cached token
                {
                    let token_read = self.access_token.read().await;
                    if let Some(t) = token_read.as_ref().filter(|t| t.is_fresh(Utc::now())) {
                        return Ok(format!("Bearer {}", t.value));
                    }
                }

                let basic = BASE64_STANDARD.encode(format!("{client_id}:{client_secret}"));
                let req_body = OAuth2TokenRequest {
                    grant_type: "client_credentials",
                    scope: scope.as_deref(),
                };

                let resp = self
                    .http_client
                    .post(token_url)
                    .header("Authorization", format!("Basic {basic}"))
                    .form(&req_body)
                    .send()
                    .await
                    .context("Failed to request OAuth2 token")?;

                if !resp.status().is_success() {
                    return Err(upstream_error(resp).await);
                }

                let token_resp: OAuth2TokenResponse = resp
                    .json()
                    .await
                    .context("Failed to parse token response")?;

                let expires_at = token_resp.expires_in.map(|secs| {
                    Utc::now() + ChronoDuration::seconds(secs - TOKEN_EXPIRY_MARGIN_SECS)
                });

                // Cache the token
                {
                    let mut token_write = self.access_token.write().await;
                    *token_write = Some(CachedToken {
                        value: token_resp.access_token.clone(),
                        expires_at,
                    });
                }

                tracing::debug!(?expires_at, "OAuth2 token refreshed");
                Ok(format!("Bearer {}", token_resp.access_token))
            }
        }
    }

    async fn read_document(resp: reqwest::Response, id: &str) -> Result<Transmission, ApiError> {
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(id.to_string()));
        }
        if !resp.status().is_success() {
            return Err(upstream_error(resp).await);
        }

        let raw: serde_json::Value = resp
            .json()
            .await
            .context("Failed to read fiscal API response")?;
        let parsed: DocumentResponse = serde_json::from_value(raw.clone())
            .map_err(|e| anyhow!("Unexpected fiscal API response: {e}"))?;

        let (protocol, access_key, message) = match parsed.autorizacao {
            Some(a) => (a.numero_protocolo, a.chave_acesso, a.motivo_status),
            None => (None, None, None),
        };

        Ok(Transmission {
            id: parsed.id,
            status: parsed.status,
            protocol,
            access_key,
            message,
            raw: Some(raw),
        })
    }
}

#[async_trait]
impl FiscalDocumentApi for HttpFiscalApi {
    async fn issue(&self, document: &BuiltDocument) -> Result<Transmission, ApiError> {
        let auth_header = self.get_auth_header().await?;
        let issue_url = format!(
            "{}/{}",
            self.base_url,
            model_path(document_model(document))
        );

        let resp = self
            .http_client
            .post(&issue_url)
            .header("Authorization", auth_header)
            .json(document)
            .send()
            .await
            .context("Failed to send document to fiscal API")?;

        let transmission = Self::read_document(resp, &document.reference).await?;

        tracing::info!(
            id = %transmission.id,
            status = %transmission.status,
            reference = %document.reference,
            "Document submitted to fiscal API"
        );

        Ok(transmission)
    }

    async fn status(&self, document: &DocumentRef) -> Result<Transmission, ApiError> {
        let auth_header = self.get_auth_header().await?;
        let status_url = format!(
            "{}/{}/{}",
            self.base_url,
            model_path(document.model),
            document.id
        );

        let resp = self
            .http_client
            .get(&status_url)
            .header("Authorization", auth_header)
            .send()
            .await
            .context("Failed to query status from fiscal API")?;

        Self::read_document(resp, &document.id).await
    }

    async fn cancel(
        &self,
        document: &DocumentRef,
        justification: &str,
    ) -> Result<Transmission, ApiError> {
        let auth_header = self.get_auth_header().await?;
        let cancel_url = format!(
            "{}/{}/{}/cancelamento",
            self.base_url,
            model_path(document.model),
            document.id
        );

        let resp = self
            .http_client
            .post(&cancel_url)
            .header("Authorization", auth_header)
            .json(&CancelRequest {
                justificativa: justification,
            })
            .send()
            .await
            .context("Failed to send cancellation to fiscal API")?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(document.id.clone()));
        }
        if !resp.status().is_success() {
            return Err(upstream_error(resp).await);
        }

        let raw: serde_json::Value = resp
            .json()
            .await
            .context("Failed to read cancellation response")?;
        let event: CancellationResponse = serde_json::from_value(raw.clone())
            .map_err(|e| anyhow!("Unexpected cancellation response: {e}"))?;

        // The event is "registrado" when the authority accepted it; the
        // document itself is then cancelled.
        let status = if event.status.eq_ignore_ascii_case("registrado") {
            CANCELLED_STATUS.to_string()
        } else {
            event.status
        };

        tracing::info!(
            id = %document.id,
            event_id = %event.id,
            status = %status,
            "Cancellation sent to fiscal API"
        );

        Ok(Transmission {
            id: document.id.clone(),
            status,
            protocol: event.numero_protocolo,
            access_key: None,
            message: event.motivo_status,
            raw: Some(raw),
        })
    }
}
