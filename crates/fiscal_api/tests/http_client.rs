use std::time::Duration;

use fiscal_api::http::{ApiAuth, HttpFiscalApi};
use fiscal_api::mock::MockFiscalApi;
use fiscal_api::{ApiError, DocumentRef, FiscalDocumentApi, CANCELLED_STATUS};
use nfe_core::models::DocumentModel;
use nfe_core::parsing::parse_invoice_request;
use nfe_core::BuiltDocument;
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn document() -> BuiltDocument {
    let body = json!({
        "reference": "ref-http-1",
        "number": 7,
        "issued_at": "2024-05-10T14:30:00-03:00",
        "issuer": {
            "tax_id": "12345678000195",
            "legal_name": "Loja Teste",
            "tax_regime": 1,
            "address": {
                "street": "Rua A", "number": "1", "neighborhood": "Centro",
                "municipality_code": "3550308", "municipality_name": "São Paulo",
                "state": "SP", "postal_code": "01001000"
            }
        },
        "recipient": {
            "tax_id": "12345678901",
            "name": "Cliente",
            "address": {
                "street": "Rua B", "number": "2", "neighborhood": "Centro",
                "municipality_code": "3550308", "municipality_name": "São Paulo",
                "state": "SP", "postal_code": "01001000"
            }
        },
        "items": [{
            "product_code": "P1", "description": "Produto", "ncm": "84713012",
            "cfop": "5102", "unit": "UN", "quantity": 1, "unit_price": 10,
            "tax_code": "102"
        }]
    });
    let request = parse_invoice_request(&body.to_string()).unwrap();
    nfe_core::build(&request).unwrap().document
}

fn api_key_client(server: &MockServer) -> std::sync::Arc<HttpFiscalApi> {
    HttpFiscalApi::new(
        server.uri(),
        ApiAuth::ApiKey {
            key: "secret-key".into(),
        },
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn issue_posts_document_and_reads_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nfe"))
        .and(header("Authorization", "Bearer secret-key"))
        .and(body_partial_json(json!({
            "ambiente": "homologacao",
            "referencia": "ref-http-1",
            "infNFe": { "versao": "4.00" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "nfe_abc",
            "status": "autorizado",
            "autorizacao": {
                "numero_protocolo": "135240000000001",
                "chave_acesso": "35240512345678000195550010000000071000000070",
                "motivo_status": "Autorizado o uso da NF-e"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = api_key_client(&server);
    let transmission = client.issue(&document()).await.unwrap();

    assert_eq!(transmission.id, "nfe_abc");
    assert!(transmission.is_authorized());
    assert_eq!(transmission.protocol.as_deref(), Some("135240000000001"));
    assert!(transmission.raw.is_some());
}

#[tokio::test]
async fn upstream_error_keeps_status_and_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nfe"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "error": { "code": "ValidationFailed", "message": "CFOP inválido" }
        })))
        .mount(&server)
        .await;

    let err = api_key_client(&server).issue(&document()).await.unwrap_err();
    match err {
        ApiError::Upstream {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 422);
            assert_eq!(code.as_deref(), Some("ValidationFailed"));
            assert_eq!(message, "CFOP inválido");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn status_of_unknown_document_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nfce/nfe_missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = api_key_client(&server)
        .status(&DocumentRef::new("nfe_missing", DocumentModel::Nfce))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(id) if id == "nfe_missing"));
}

#[tokio::test]
async fn registered_cancellation_marks_document_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nfe/nfe_abc/cancelamento"))
        .and(body_partial_json(json!({
            "justificativa": "Pedido cancelado pelo cliente"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "evt_1",
            "status": "registrado",
            "numero_protocolo": "135240000000099",
            "motivo_status": "Evento registrado e vinculado a NF-e"
        })))
        .mount(&server)
        .await;

    let transmission = api_key_client(&server)
        .cancel(
            &DocumentRef::new("nfe_abc", DocumentModel::Nfe),
            "Pedido cancelado pelo cliente",
        )
        .await
        .unwrap();
    assert_eq!(transmission.id, "nfe_abc");
    assert_eq!(transmission.status, CANCELLED_STATUS);
    assert_eq!(transmission.protocol.as_deref(), Some("135240000000099"));
}

#[tokio::test]
async fn oauth2_token_is_fetched_once_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("Authorization", "Basic aWQ6c2VjcmV0"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nfe/nfe_abc"))
        .and(header("Authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "nfe_abc",
            "status": "processando"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = HttpFiscalApi::new(
        server.uri(),
        ApiAuth::OAuth2 {
            client_id: "id".into(),
            client_secret: "secret".into(),
            token_url: format!("{}/oauth/token", server.uri()),
            scope: None,
        },
        Duration::from_secs(5),
    )
    .unwrap();

    let doc = DocumentRef::new("nfe_abc", DocumentModel::Nfe);
    let first = client.status(&doc).await.unwrap();
    let second = client.status(&doc).await.unwrap();
    assert_eq!(first.status, "processando");
    assert!(!second.is_authorized());
}

#[tokio::test]
async fn mock_api_only_cancels_authorized_documents() {
    let api = MockFiscalApi::new();
    let issued = api.issue(&document()).await.unwrap();
    assert!(issued.is_authorized());
    assert_eq!(issued.access_key.as_ref().map(String::len), Some(44));

    let doc = DocumentRef::new(issued.id.clone(), DocumentModel::Nfe);
    api.set_status(&issued.id, "processando").await;
    let err = api.cancel(&doc, "Erro de digitação no pedido").await.unwrap_err();
    assert!(matches!(err, ApiError::Upstream { status: 400, .. }));

    api.set_status(&issued.id, "autorizado").await;
    let cancelled = api.cancel(&doc, "Erro de digitação no pedido").await.unwrap();
    assert_eq!(cancelled.status, CANCELLED_STATUS);
    assert_eq!(api.cancel_calls(), 2);
}

#[tokio::test]
async fn persistent_mock_answers_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("mock.db");

    let issued = {
        let api = MockFiscalApi::open(&db).unwrap();
        api.issue(&document()).await.unwrap()
    };

    let api = MockFiscalApi::open(&db).unwrap();
    let doc = DocumentRef::new(issued.id.clone(), DocumentModel::Nfe);
    let status = api.status(&doc).await.unwrap();
    assert_eq!(status.status, "autorizado");
    assert_eq!(status.access_key, issued.access_key);

    let cancelled = api.cancel(&doc, "Pedido cancelado pelo cliente").await.unwrap();
    assert_eq!(cancelled.status, CANCELLED_STATUS);
    assert_eq!(api.status(&doc).await.unwrap().status, CANCELLED_STATUS);
}
