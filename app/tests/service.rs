use std::sync::Arc;
use std::time::Duration;

use fiscal_api::http::{ApiAuth, HttpFiscalApi};
use fiscal_api::mock::MockFiscalApi;
use fiscal_api::FiscalDocumentApi;
use nfe_app::identity::StaticIdentityProvider;
use nfe_app::{InvoiceService, ServiceError};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use store::{AuditLog, InvoiceStore};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ALICE: &str = "t-alice";
const BOB: &str = "t-bob";

fn request_body() -> Value {
    json!({
        "reference": "pedido-77",
        "number": 77,
        "issued_at": "2024-05-10T14:30:00-03:00",
        "issuer": {
            "tax_id": "12345678000195",
            "legal_name": "Loja Teste LTDA",
            "state_registration": "",
            "tax_regime": 1,
            "address": {
                "street": "Rua A", "number": "1", "neighborhood": "Centro",
                "municipality_code": "3550308", "municipality_name": "São Paulo",
                "state": "SP", "postal_code": "01001-000"
            }
        },
        "recipient": {
            "tax_id": "123.456.789-01",
            "name": "Cliente Final",
            "address": {
                "street": "Rua B", "number": "2", "neighborhood": "Centro",
                "municipality_code": "3550308", "municipality_name": "São Paulo",
                "state": "SP", "postal_code": "01001-000"
            }
        },
        "items": [{
            "product_code": "P1", "description": "Produto", "ncm": "84713012",
            "cfop": "5102", "unit": "UN", "quantity": 3, "unit_price": "3.333",
            "tax_code": "102"
        }]
    })
}

struct Harness {
    service: InvoiceService,
    audit: AuditLog,
    _dir: TempDir,
}

fn harness(api: Arc<dyn FiscalDocumentApi>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let audit = AuditLog::in_dir(dir.path());
    let identity = Arc::new(StaticIdentityProvider::new([(ALICE, "alice"), (BOB, "bob")]));
    let service = InvoiceService::new(identity, api, InvoiceStore::temporary().unwrap(), audit.clone())
        .with_status_retry(Duration::from_millis(1), Duration::from_secs(2));
    Harness {
        service,
        audit,
        _dir: dir,
    }
}

fn event_types(audit: &AuditLog) -> Vec<String> {
    audit
        .read_all()
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

#[tokio::test]
async fn issue_persists_summary_once_after_upstream_success() {
    let api = MockFiscalApi::new();
    let h = harness(api.clone());

    let outcome = h
        .service
        .issue(ALICE, &request_body().to_string())
        .await
        .unwrap();
    let record = &outcome.record;

    assert_eq!(record.owner, "alice");
    assert_eq!(record.status, "autorizado");
    assert!(record.external_id.starts_with("nfe_"));
    assert_eq!(record.reference, "pedido-77");
    assert_eq!(record.total, dec!(10.00));
    assert_eq!(record.items.len(), 1);
    assert_eq!(record.payload_sha256.len(), 64);
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.path == "issuer.state_registration"));

    let listed = h.service.list(ALICE).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, record.id);
    assert_eq!(event_types(&h.audit), vec!["invoice_issued"]);
}

#[tokio::test]
async fn invalid_token_is_rejected_before_anything_else() {
    let h = harness(MockFiscalApi::new());
    let err = h
        .service
        .issue("nope", &request_body().to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "unauthenticated");
    assert!(h.service.list(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_body_fails_validation_without_store_write() {
    let h = harness(MockFiscalApi::new());
    let mut body = request_body();
    body.as_object_mut().unwrap().remove("recipient");

    let err = h.service.issue(ALICE, &body.to_string()).await.unwrap_err();
    match err {
        ServiceError::Validation { path, .. } => assert_eq!(path, "recipient"),
        other => panic!("unexpected error {other:?}"),
    }

    let err = h.service.issue(ALICE, "not json").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation { ref path, .. } if path == "body"));

    assert!(h.service.list(ALICE).await.unwrap().is_empty());
    assert!(event_types(&h.audit).is_empty());
}

#[tokio::test]
async fn omitted_header_fields_are_filled() {
    let h = harness(MockFiscalApi::new());
    let mut body = request_body();
    let object = body.as_object_mut().unwrap();
    object.remove("reference");
    object.remove("issued_at");

    let request = h.service.prepare(&body.to_string()).unwrap();
    assert_eq!(request.reference.len(), 36);
    assert!(request.issued_at.is_some());
    assert_eq!(request.series, 1);
    assert_eq!(request.nature_of_operation, "VENDA");
}

#[tokio::test]
async fn short_justification_fails_before_any_upstream_call() {
    let api = MockFiscalApi::new();
    let h = harness(api.clone());
    let record = h
        .service
        .issue(ALICE, &request_body().to_string())
        .await
        .unwrap()
        .record;

    let err = h
        .service
        .cancel(ALICE, &record.id, "   too short   ")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert_eq!(api.cancel_calls(), 0);
}

#[tokio::test]
async fn processing_invoice_cannot_be_cancelled() {
    let api = MockFiscalApi::new();
    let h = harness(api.clone());
    let record = h
        .service
        .issue(ALICE, &request_body().to_string())
        .await
        .unwrap()
        .record;
    api.set_status(&record.external_id, "processando").await;

    let err = h
        .service
        .cancel(ALICE, &record.id, "Pedido cancelado pelo cliente")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert_eq!(api.cancel_calls(), 0);

    let listed = h.service.list(ALICE).await.unwrap();
    assert_eq!(listed[0].status, "processando");
    assert!(listed[0].cancelled_at.is_none());
}

#[tokio::test]
async fn authorized_invoice_is_cancelled_and_recorded() {
    let api = MockFiscalApi::new();
    let h = harness(api.clone());
    let record = h
        .service
        .issue(ALICE, &request_body().to_string())
        .await
        .unwrap()
        .record;

    let cancelled = h
        .service
        .cancel(ALICE, &record.id, "  Pedido cancelado pelo cliente  ")
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelado");
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(
        cancelled.cancel_justification.as_deref(),
        Some("Pedido cancelado pelo cliente")
    );
    assert_eq!(api.cancel_calls(), 1);
    assert_eq!(
        event_types(&h.audit),
        vec!["invoice_issued", "invoice_cancelled"]
    );
}

#[tokio::test]
async fn records_of_other_owners_look_missing() {
    let api = MockFiscalApi::new();
    let h = harness(api.clone());
    let record = h
        .service
        .issue(ALICE, &request_body().to_string())
        .await
        .unwrap()
        .record;

    let err = h.service.status(BOB, &record.id).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    let err = h
        .service
        .cancel(BOB, &record.id, "Pedido cancelado pelo cliente")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert_eq!(api.cancel_calls(), 0);

    let err = h.service.status(ALICE, "missing").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert!(h.service.list(BOB).await.unwrap().is_empty());
}

#[tokio::test]
async fn status_refresh_persists_upstream_status() {
    let api = MockFiscalApi::with_issue_status("processando");
    let h = harness(api.clone());
    let record = h
        .service
        .issue(ALICE, &request_body().to_string())
        .await
        .unwrap()
        .record;
    assert_eq!(record.status, "processando");

    api.set_status(&record.external_id, "autorizado").await;
    let refreshed = h.service.status(ALICE, &record.id).await.unwrap();
    assert_eq!(refreshed.status, "autorizado");
    assert!(refreshed.updated_at >= record.updated_at);
    assert_eq!(
        event_types(&h.audit),
        vec!["invoice_issued", "status_refreshed"]
    );
}

fn http_api(server: &MockServer) -> Arc<dyn FiscalDocumentApi> {
    HttpFiscalApi::new(
        server.uri(),
        ApiAuth::ApiKey { key: "k".into() },
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn upstream_rejection_is_surfaced_and_not_stored() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nfe"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "error": { "code": "ValidationFailed", "message": "CFOP inválido" }
        })))
        .mount(&server)
        .await;
    let h = harness(http_api(&server));

    let err = h
        .service
        .issue(ALICE, &request_body().to_string())
        .await
        .unwrap_err();
    match err {
        ServiceError::Upstream { status, code, .. } => {
            assert_eq!(status, 422);
            assert_eq!(code.as_deref(), Some("ValidationFailed"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(h.service.list(ALICE).await.unwrap().is_empty());
    assert_eq!(event_types(&h.audit), vec!["issue_failed"]);
}

#[tokio::test]
async fn status_query_is_retried_on_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nfe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "nfe_http_1",
            "status": "processando"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nfe/nfe_http_1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nfe/nfe_http_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "nfe_http_1",
            "status": "autorizado",
            "autorizacao": { "numero_protocolo": "135240000000123" }
        })))
        .with_priority(2)
        .mount(&server)
        .await;
    let h = harness(http_api(&server));

    let record = h
        .service
        .issue(ALICE, &request_body().to_string())
        .await
        .unwrap()
        .record;
    let refreshed = h.service.status(ALICE, &record.id).await.unwrap();
    assert_eq!(refreshed.status, "autorizado");
    assert_eq!(refreshed.protocol.as_deref(), Some("135240000000123"));
}
