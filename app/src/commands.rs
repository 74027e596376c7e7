use anyhow::{Context, Result};
use config::AppConfig;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{ErrorReport, ServiceError};
use crate::service::InvoiceService;

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceFile {
    pub path: String,
    pub size_bytes: u64,
}

/// Outcome of one file in a folder issuance.
#[derive(Debug, Serialize)]
pub struct FileResult {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

fn read_body(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// `*.json` request files under `dir`, in path order.
pub fn scan_folder(dir: &Path) -> Result<Vec<InvoiceFile>> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }
    let mut result = Vec::new();
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.file_type().is_file() {
            let p = entry.path();
            if let Some(ext) = p.extension().and_then(|e| e.to_str()) {
                if ext.eq_ignore_ascii_case("json") {
                    let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    result.push(InvoiceFile {
                        path: p.display().to_string(),
                        size_bytes,
                    });
                }
            }
        }
    }
    Ok(result)
}

/// Dry run. Every validation problem is listed instead of only the first.
pub fn build(service: &InvoiceService, path: &Path) -> Result<serde_json::Value> {
    let body = read_body(path)?;
    let request = service.prepare(&body)?;
    if let Err(errors) = nfe_core::validation::validate(&request) {
        return Ok(serde_json::json!({ "valid": false, "errors": errors }));
    }
    let built = nfe_core::build(&request).map_err(ServiceError::from)?;
    Ok(serde_json::json!({
        "valid": true,
        "document": built.document,
        "diagnostics": built.diagnostics,
    }))
}

pub async fn issue(service: &InvoiceService, token: &str, path: &Path) -> Result<serde_json::Value> {
    let body = read_body(path)?;
    let outcome = service.issue(token, &body).await?;
    tracing::info!(invoice_id = %outcome.record.id, path = %path.display(), "issued invoice");
    Ok(serde_json::to_value(outcome)?)
}

/// Issue every request file under `dir`. A failing file is reported and the
/// rest still go out.
pub async fn issue_dir(service: &InvoiceService, token: &str, dir: &Path) -> Result<Vec<FileResult>> {
    let mut out = Vec::new();
    for file in scan_folder(dir)? {
        let path = PathBuf::from(&file.path);
        let body = match read_body(&path) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(path = %file.path, error = %err, "request file not readable");
                out.push(FileResult {
                    path: file.path,
                    invoice_id: None,
                    status: None,
                    error: Some(ServiceError::Internal(format!("{err:#}")).report()),
                });
                continue;
            }
        };
        let result = match service.issue(token, &body).await {
            Ok(outcome) => FileResult {
                path: file.path,
                invoice_id: Some(outcome.record.id),
                status: Some(outcome.record.status),
                error: None,
            },
            Err(err) => {
                tracing::warn!(path = %file.path, error = %err, "request file not issued");
                FileResult {
                    path: file.path,
                    invoice_id: None,
                    status: None,
                    error: Some(err.report()),
                }
            }
        };
        out.push(result);
    }
    Ok(out)
}

pub async fn status(service: &InvoiceService, token: &str, id: &str) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(service.status(token, id).await?)?)
}

pub async fn cancel(
    service: &InvoiceService,
    token: &str,
    id: &str,
    justification: &str,
) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(
        service.cancel(token, id, justification).await?,
    )?)
}

pub async fn list(service: &InvoiceService, token: &str) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(service.list(token).await?)?)
}

pub fn get_settings() -> Result<AppConfig> {
    config::load()
}

pub fn update_setting(key: &str, value: &str) -> Result<AppConfig> {
    let mut cfg = config::load()?;
    cfg.set(key, value)?;
    config::store(&cfg)?;
    tracing::info!(%key, "Settings updated");
    Ok(cfg)
}

pub fn set_secret(name: &str, value: &str) -> Result<()> {
    config::store_secret(name, value)?;
    tracing::info!(%name, "Secret stored in keychain");
    Ok(())
}

pub fn delete_secret(name: &str) -> Result<()> {
    config::delete_secret(name)?;
    tracing::info!(%name, "Secret removed from keychain");
    Ok(())
}
