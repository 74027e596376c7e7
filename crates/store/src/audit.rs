use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const AUDIT_FILE_NAME: &str = "audit.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event_type: String,
    pub invoice_id: Option<String>,
    pub external_id: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub owner: Option<String>,
    pub payload_sha256: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: &str, status: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            invoice_id: None,
            external_id: None,
            status: status.to_string(),
            error: None,
            owner: None,
            payload_sha256: None,
        }
    }

    pub fn with_invoice_id(mut self, invoice_id: impl Into<String>) -> Self {
        self.invoice_id = Some(invoice_id.into());
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.payload_sha256 = Some(hash.into());
        self
    }
}

/// Append-only JSON-lines log, one event per line.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `audit.jsonl` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(AUDIT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, event: &AuditEvent) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json)?;
        tracing::debug!(
            event_type = %event.event_type,
            invoice_id = ?event.invoice_id,
            "Audit event written"
        );
        Ok(())
    }

    /// Every event written so far, oldest first.
    pub fn read_all(&self) -> Result<Vec<AuditEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("Malformed audit line"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_appended_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::in_dir(dir.path().join("nested"));

        log.write(
            &AuditEvent::new("invoice_issued", "autorizado")
                .with_invoice_id("abc")
                .with_external_id("nfe_1")
                .with_owner("alice"),
        )
        .unwrap();
        log.write(&AuditEvent::new("issue_failed", "failed").with_error("422 CFOP inválido"))
            .unwrap();

        let events = log.read_all().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].invoice_id.as_deref(), Some("abc"));
        assert_eq!(events[1].error.as_deref(), Some("422 CFOP inválido"));
        assert!(log.path().ends_with(AUDIT_FILE_NAME));
    }

    #[test]
    fn missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AuditLog::in_dir(dir.path()).read_all().unwrap().is_empty());
    }
}
