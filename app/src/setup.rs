use anyhow::{anyhow, bail, Context, Result};
use config::{AppConfig, IdentityKind, ProviderKind};
use fiscal_api::{
    http::{ApiAuth, HttpFiscalApi},
    mock::MockFiscalApi,
    FiscalDocumentApi,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use store::{AuditLog, InvoiceStore};

use crate::identity::{IdentityProvider, JwtIdentityProvider, StaticIdentityProvider};
use crate::service::InvoiceService;

const DATABASE_DIR: &str = "invoices.db";
const MOCK_API_DIR: &str = "mock_api.db";
const MOCK_LATENCY: Duration = Duration::from_millis(200);

/// The mock keeps its documents under `data_dir` so later runs can query and
/// cancel what earlier runs issued.
pub fn create_fiscal_api_client(
    cfg: &AppConfig,
    data_dir: &Path,
) -> Result<Arc<dyn FiscalDocumentApi>> {
    match cfg.provider.kind {
        ProviderKind::Http => {
            let base_url = cfg
                .provider
                .base_url
                .clone()
                .ok_or_else(|| anyhow!("provider.base_url not configured"))?;
            let timeout = Duration::from_secs(cfg.provider.timeout_secs);

            // OAuth2 when a client id is configured, API key otherwise
            let auth = match cfg.provider.client_id.clone() {
                Some(client_id) => {
                    let client_secret = config::resolve_secret(config::CLIENT_SECRET)?;
                    let token_url = cfg
                        .provider
                        .token_url
                        .clone()
                        .unwrap_or_else(|| format!("{}/oauth/token", base_url.trim_end_matches('/')));
                    tracing::info!("Using fiscal API with OAuth2 auth");
                    ApiAuth::OAuth2 {
                        client_id,
                        client_secret,
                        token_url,
                        scope: cfg.provider.scope.clone(),
                    }
                }
                None => {
                    tracing::info!("Using fiscal API with API key auth");
                    ApiAuth::ApiKey {
                        key: config::resolve_secret(config::API_KEY)?,
                    }
                }
            };
            Ok(HttpFiscalApi::new(base_url, auth, timeout)?)
        }
        ProviderKind::Mock => {
            tracing::info!("Using mock fiscal API");
            let api = MockFiscalApi::open(data_dir.join(MOCK_API_DIR))?;
            Ok(Arc::new(api.with_latency(MOCK_LATENCY)))
        }
    }
}

pub fn create_identity_provider(cfg: &AppConfig) -> Result<Arc<dyn IdentityProvider>> {
    match cfg.identity.kind {
        IdentityKind::Jwt => {
            let secret = config::resolve_secret(config::JWT_SECRET)?;
            Ok(Arc::new(JwtIdentityProvider::new(
                secret.as_bytes(),
                cfg.identity.issuer.as_deref(),
                cfg.identity.audience.as_deref(),
            )))
        }
        // static tokens are well known; never let them reach a real provider
        IdentityKind::Static if cfg.provider.kind == ProviderKind::Http => {
            bail!("identity.kind = static is only allowed with the mock provider, set identity.kind = jwt")
        }
        IdentityKind::Static => Ok(Arc::new(StaticIdentityProvider::new(
            cfg.identity.tokens.clone(),
        ))),
    }
}

/// Wire the service from configuration: clients, database and audit log
/// under the data directory.
pub fn open_service(cfg: &AppConfig) -> Result<InvoiceService> {
    let data_dir = cfg.resolved_data_dir()?;
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let store = InvoiceStore::open(data_dir.join(DATABASE_DIR))
        .context("Failed to open invoice database")?;
    let audit = AuditLog::in_dir(&data_dir);

    Ok(InvoiceService::new(
        create_identity_provider(cfg)?,
        create_fiscal_api_client(cfg, &data_dir)?,
        store,
        audit,
    )
    .with_defaults(cfg.environment, cfg.defaults.clone()))
}
