//! Issue, query and cancel invoices for an authenticated caller.

use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use chrono::{Local, Utc};
use config::DocumentDefaults;
use fiscal_api::{ApiError, DocumentRef, FiscalDocumentApi, Transmission, MIN_JUSTIFICATION_CHARS};
use nfe_core::models::{Environment, InvoiceRequest};
use nfe_core::parsing::document_digest;
use nfe_core::Diagnostic;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use store::{AuditEvent, AuditLog, InvoiceRecord, InvoiceStore, ItemSummary, NewInvoice};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::identity::{IdentityProvider, Subject};

const STATUS_RETRY_DELAY: Duration = Duration::from_millis(250);
const STATUS_RETRY_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct IssueOutcome {
    pub record: InvoiceRecord,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct InvoiceService {
    identity: Arc<dyn IdentityProvider>,
    api: Arc<dyn FiscalDocumentApi>,
    store: InvoiceStore,
    audit: AuditLog,
    environment: Environment,
    defaults: DocumentDefaults,
    status_retry_delay: Duration,
    status_retry_window: Duration,
}

impl InvoiceService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        api: Arc<dyn FiscalDocumentApi>,
        store: InvoiceStore,
        audit: AuditLog,
    ) -> Self {
        Self {
            identity,
            api,
            store,
            audit,
            environment: Environment::default(),
            defaults: DocumentDefaults::default(),
            status_retry_delay: STATUS_RETRY_DELAY,
            status_retry_window: STATUS_RETRY_WINDOW,
        }
    }

    /// Values applied to request bodies that leave them out.
    pub fn with_defaults(mut self, environment: Environment, defaults: DocumentDefaults) -> Self {
        self.environment = environment;
        self.defaults = defaults;
        self
    }

    pub fn with_status_retry(mut self, delay: Duration, window: Duration) -> Self {
        self.status_retry_delay = delay;
        self.status_retry_window = window;
        self
    }

    async fn authenticate(&self, token: &str) -> Result<Subject, ServiceError> {
        Ok(self.identity.verify(token).await?)
    }

    /// Parse a request body and fill what the caller may omit: configured
    /// defaults for absent keys, a fresh reference and the emission time.
    pub fn prepare(&self, body: &str) -> Result<InvoiceRequest, ServiceError> {
        let mut value: Value = serde_json::from_str(body)
            .map_err(|e| ServiceError::validation("body", e.to_string()))?;
        let Some(object) = value.as_object_mut() else {
            return Err(ServiceError::validation("body", "expected a JSON object"));
        };

        let defaults = [
            ("environment", serde_json::to_value(self.environment)),
            ("model", serde_json::to_value(self.defaults.model)),
            ("series", serde_json::to_value(self.defaults.series)),
            (
                "nature_of_operation",
                serde_json::to_value(&self.defaults.nature_of_operation),
            ),
        ];
        for (key, default) in defaults {
            if object.get(key).map_or(true, Value::is_null) {
                let default =
                    default.map_err(|e| ServiceError::Internal(format!("default {key}: {e}")))?;
                object.insert(key.to_string(), default);
            }
        }

        let mut request: InvoiceRequest = serde_json::from_value(value)
            .map_err(|e| ServiceError::validation("body", e.to_string()))?;
        if request.reference.trim().is_empty() {
            request.reference = Uuid::new_v4().to_string();
        }
        if request.issued_at.is_none() {
            request.issued_at = Some(Local::now().fixed_offset());
        }
        Ok(request)
    }

    pub async fn issue(&self, token: &str, body: &str) -> Result<IssueOutcome, ServiceError> {
        let subject = self.authenticate(token).await?;
        let request = self.prepare(body)?;
        let built = nfe_core::build(&request)?;
        let digest = document_digest(&built.document)
            .map_err(|e| ServiceError::Internal(format!("serialize document: {e}")))?;

        let transmission = match self.api.issue(&built.document).await {
            Ok(t) => t,
            Err(err) => {
                self.record_audit(
                    AuditEvent::new("issue_failed", "failed")
                        .with_owner(&subject.id)
                        .with_hash(&digest)
                        .with_error(err.to_string()),
                );
                tracing::warn!(reference = %request.reference, error = %err, "Issuance failed");
                return Err(err.into());
            }
        };

        let inserted = self.store.insert(NewInvoice {
            owner: subject.id.clone(),
            external_id: transmission.id.clone(),
            status: transmission.status.clone(),
            protocol: transmission.protocol.clone(),
            access_key: transmission.access_key.clone(),
            model: request.model,
            environment: request.environment,
            reference: built.document.reference.clone(),
            items: built.document.info.items.iter().map(ItemSummary::from).collect(),
            total: built.document.total(),
            payload_sha256: digest.clone(),
        });
        let record = match inserted {
            Ok(record) => record,
            Err(err) => return Err(self.unrecorded_issue(&subject, &transmission, &digest, err.into())),
        };

        self.record_audit(
            AuditEvent::new("invoice_issued", &record.status)
                .with_invoice_id(&record.id)
                .with_external_id(&record.external_id)
                .with_owner(&subject.id)
                .with_hash(digest),
        );
        tracing::info!(
            invoice_id = %record.id,
            external_id = %record.external_id,
            status = %record.status,
            total = %record.total,
            "Invoice issued"
        );

        Ok(IssueOutcome {
            record,
            diagnostics: built.diagnostics,
        })
    }

    /// The document exists upstream but has no local record. The audit log
    /// keeps its upstream id so it can still be found and cancelled.
    fn unrecorded_issue(
        &self,
        subject: &Subject,
        transmission: &Transmission,
        digest: &str,
        err: ServiceError,
    ) -> ServiceError {
        self.record_audit(
            AuditEvent::new("issue_unrecorded", &transmission.status)
                .with_external_id(&transmission.id)
                .with_owner(&subject.id)
                .with_hash(digest)
                .with_error(err.to_string()),
        );
        tracing::error!(
            external_id = %transmission.id,
            status = %transmission.status,
            error = %err,
            "Invoice issued upstream but not recorded locally"
        );
        err
    }

    /// Record `id` when it belongs to `subject`. Someone else's record is
    /// reported exactly like a missing one.
    fn owned_record(&self, subject: &Subject, id: &str) -> Result<InvoiceRecord, ServiceError> {
        let record = self.store.get(id)?;
        if record.owner != subject.id {
            return Err(ServiceError::NotFound(format!("invoice {id}")));
        }
        Ok(record)
    }

    /// Status query, retried with exponential backoff on transport and 5xx
    /// failures until the retry window closes.
    async fn fetch_status(&self, doc: &DocumentRef) -> Result<Transmission, ApiError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.status_retry_delay)
            .with_max_elapsed_time(Some(self.status_retry_window))
            .build();

        retry(policy, || async {
            self.api.status(doc).await.map_err(|err| {
                if is_transient(&err) {
                    tracing::warn!(id = %doc.id, error = %err, "Status query failed, retrying");
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        })
        .await
    }

    fn apply_status(&self, id: &str, t: &Transmission) -> Result<InvoiceRecord, ServiceError> {
        Ok(self.store.update(id, |rec| {
            rec.status = t.status.clone();
            if t.protocol.is_some() {
                rec.protocol = t.protocol.clone();
            }
            if t.access_key.is_some() {
                rec.access_key = t.access_key.clone();
            }
        })?)
    }

    /// Refresh the status from the API and persist it.
    pub async fn status(&self, token: &str, id: &str) -> Result<InvoiceRecord, ServiceError> {
        let subject = self.authenticate(token).await?;
        let record = self.owned_record(&subject, id)?;
        let doc = DocumentRef::new(&record.external_id, record.model);

        let transmission = self.fetch_status(&doc).await?;
        let updated = self.apply_status(id, &transmission)?;

        self.record_audit(
            AuditEvent::new("status_refreshed", &updated.status)
                .with_invoice_id(id)
                .with_external_id(&updated.external_id)
                .with_owner(&subject.id),
        );
        Ok(updated)
    }

    pub async fn cancel(
        &self,
        token: &str,
        id: &str,
        justification: &str,
    ) -> Result<InvoiceRecord, ServiceError> {
        let subject = self.authenticate(token).await?;

        let justification = justification.trim();
        if justification.chars().count() < MIN_JUSTIFICATION_CHARS {
            return Err(ServiceError::validation(
                "justification",
                format!("must have at least {MIN_JUSTIFICATION_CHARS} characters"),
            ));
        }

        let record = self.owned_record(&subject, id)?;
        let doc = DocumentRef::new(&record.external_id, record.model);

        let current = self.fetch_status(&doc).await?;
        if !current.is_authorized() {
            self.apply_status(id, &current)?;
            return Err(ServiceError::InvalidState(format!(
                "invoice {id} is {}, only authorized invoices can be cancelled",
                current.status
            )));
        }

        let transmission = match self.api.cancel(&doc, justification).await {
            Ok(t) => t,
            Err(err) => {
                self.record_audit(
                    AuditEvent::new("cancel_failed", &record.status)
                        .with_invoice_id(id)
                        .with_external_id(&record.external_id)
                        .with_owner(&subject.id)
                        .with_error(err.to_string()),
                );
                tracing::warn!(invoice_id = %id, error = %err, "Cancellation failed");
                return Err(err.into());
            }
        };

        let updated = self.store.update(id, |rec| {
            rec.status = transmission.status.clone();
            if transmission.protocol.is_some() {
                rec.protocol = transmission.protocol.clone();
            }
            rec.cancelled_at = Some(Utc::now());
            rec.cancel_justification = Some(justification.to_string());
        })?;

        self.record_audit(
            AuditEvent::new("invoice_cancelled", &updated.status)
                .with_invoice_id(id)
                .with_external_id(&updated.external_id)
                .with_owner(&subject.id),
        );
        tracing::info!(invoice_id = %id, status = %updated.status, "Invoice cancelled");
        Ok(updated)
    }

    /// Caller's records, newest first.
    pub async fn list(&self, token: &str) -> Result<Vec<InvoiceRecord>, ServiceError> {
        let subject = self.authenticate(token).await?;
        Ok(self.store.list_by_owner(&subject.id)?)
    }

    /// Audit failures are logged, never surfaced to the caller.
    fn record_audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.write(&event) {
            tracing::error!(error = %e, event_type = %event.event_type, "Failed to write audit event");
        }
    }
}

fn is_transient(err: &ApiError) -> bool {
    match err {
        ApiError::Transport(_) => true,
        ApiError::Upstream { status, .. } => *status >= 500,
        ApiError::NotFound(_) => false,
    }
}
