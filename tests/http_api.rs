//! HTTP API tests.
//!
//! Requests go straight into the router with `oneshot`, so no port is
//! bound. Each test gets its own temporary vault.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::Engine;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt;

use lexvault::config::Config;
use lexvault::server::{build_router, AppState};
use lexvault::vault::Vault;

async fn setup_app(tmp: &TempDir) -> Router {
    let mut config = Config::ephemeral(tmp.path());
    config.retrieval.min_score = -1.0;
    let vault = Vault::open(config).await.unwrap();
    build_router(AppState::new(Arc::new(vault)))
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn login(app: &Router, username: &str) -> String {
    let creds = json!({ "username": username, "password": "pw123" });
    let (status, _) = send(app, request("POST", "/auth/register", None, Some(creds.clone()))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(app, request("POST", "/auth/login", None, Some(creds))).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

async fn upload(app: &Router, token: &str, filename: &str, content: &[u8]) -> String {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/documents",
            Some(token),
            Some(json!({ "filename": filename, "content_base64": b64(content) })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["document"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let app = setup_app(&tmp).await;

    let (status, body) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_bad_credentials_and_missing_token() {
    let tmp = TempDir::new().unwrap();
    let app = setup_app(&tmp).await;
    login(&app, "alice").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "authentication_failed");

    let (status, body) = send(&app, request("GET", "/documents", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _) = send(&app, request("GET", "/documents", Some("not-a-token"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let tmp = TempDir::new().unwrap();
    let app = setup_app(&tmp).await;
    login(&app, "alice").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "alice", "password": "x" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "duplicate_username");
}

#[tokio::test]
async fn test_document_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let app = setup_app(&tmp).await;
    let token = login(&app, "alice").await;

    let id = upload(&app, &token, "lease.txt", b"Termination clause: 30 days notice.").await;

    let (status, body) = send(&app, request("GET", "/documents", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documents"].as_array().unwrap().len(), 1);
    assert_eq!(body["documents"][0]["filename"], "lease.txt");

    let (status, body) = send(
        &app,
        request("GET", &format!("/documents/{}", id), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content_base64"], b64(b"Termination clause: 30 days notice."));

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/query",
            Some(&token),
            Some(json!({ "question": "What is the notice period?" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["answer"].as_str().unwrap().contains("30 days"));
    assert_eq!(body["sources"], json!(["lease.txt"]));

    let (status, body) = send(
        &app,
        request("POST", &format!("/documents/{}/reindex", id), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunks"], 1);

    let (status, body) = send(
        &app,
        request("POST", &format!("/documents/{}/analyze", id), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["analysis"].as_str().unwrap().contains("Termination"));

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/documents/{}", id), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        &app,
        request("GET", &format!("/documents/{}", id), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_other_users_documents_are_forbidden() {
    let tmp = TempDir::new().unwrap();
    let app = setup_app(&tmp).await;
    let alice = login(&app, "alice").await;
    let bob = login(&app, "bob").await;

    let id = upload(&app, &bob, "bob.txt", b"Bob's secret is marmalade.").await;

    for (method, uri) in [
        ("GET", format!("/documents/{}", id)),
        ("DELETE", format!("/documents/{}", id)),
        ("POST", format!("/documents/{}/analyze", id)),
    ] {
        let (status, body) = send(&app, request(method, &uri, Some(&alice), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{} {}", method, uri);
        assert_eq!(body["error"]["code"], "forbidden");
    }

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/query",
            Some(&alice),
            Some(json!({ "question": "What is Bob's secret?" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["answer"].as_str().unwrap().contains("marmalade"));
    assert_eq!(body["sources"], json!([]));
}

#[tokio::test]
async fn test_invalid_upload_bodies() {
    let tmp = TempDir::new().unwrap();
    let app = setup_app(&tmp).await;
    let token = login(&app, "alice").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/documents",
            Some(&token),
            Some(json!({ "filename": "a.txt", "content_base64": "***" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/documents",
            Some(&token),
            Some(json!({ "filename": "a.exe", "content_base64": b64(b"MZ") })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_revokes_token_and_audit_is_scoped() {
    let tmp = TempDir::new().unwrap();
    let app = setup_app(&tmp).await;
    let alice = login(&app, "alice").await;
    let bob = login(&app, "bob").await;

    let (status, body) = send(&app, request("GET", "/audit?limit=10", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    let actions: Vec<&str> = entries.iter().map(|e| e["action"].as_str().unwrap()).collect();
    assert_eq!(actions, vec!["LOGIN", "REGISTER"]);

    let (status, body) = send(
        &app,
        request("GET", "/audit?limit=10&order=asc", Some(&alice), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["REGISTER", "LOGIN"]);

    let (status, _) = send(&app, request("GET", "/audit?order=sideways", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, request("POST", "/auth/logout", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, request("GET", "/audit", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Bob's session is unaffected.
    let (status, _) = send(&app, request("GET", "/documents", Some(&bob), None)).await;
    assert_eq!(status, StatusCode::OK);
}
