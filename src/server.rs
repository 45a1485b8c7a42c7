//! JSON HTTP API over the [`Vault`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/auth/register` | Create an account |
//! | `POST` | `/auth/login` | Exchange credentials for a bearer token |
//! | `POST` | `/auth/logout` | Revoke the current token |
//! | `GET`  | `/documents` | List own documents |
//! | `POST` | `/documents` | Upload (base64 content) |
//! | `GET`  | `/documents/{id}` | Download decrypted content (base64) |
//! | `DELETE` | `/documents/{id}` | Delete a document and its chunks |
//! | `POST` | `/documents/{id}/reindex` | Retry indexing |
//! | `POST` | `/documents/{id}/analyze` | Contract risk analysis |
//! | `POST` | `/query` | Ask a question over own documents |
//! | `GET`  | `/audit?limit=` | Audit entries visible to the caller |
//!
//! # Sessions
//!
//! Login returns a random 256-bit hex token. Tokens live in memory only and
//! expire after `server.session_ttl_secs` without use; restarting the server
//! logs everyone out.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "forbidden", "message": "You do not have access to this document" } }
//! ```
//!
//! Codes come from [`VaultError::code`]; messages from
//! [`VaultError::public_message`] and never include internal details.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use lexvault_core::models::{AuditEntry, Document, Identity, QueryAnswer};

use crate::error::VaultError;
use crate::vault::{UploadReport, Vault};

#[derive(Clone)]
pub struct AppState {
    vault: Arc<Vault>,
    sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(vault: Arc<Vault>) -> Self {
        let ttl = Duration::from_secs(vault.config().server.session_ttl_secs);
        Self {
            vault,
            sessions: Arc::new(SessionStore::new(ttl)),
        }
    }
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(vault: Arc<Vault>) -> anyhow::Result<()> {
    let bind_addr = vault.config().server.bind.clone();
    let app = build_router(AppState::new(vault));

    println!("LexVault API listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "HTTP server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/auth/register", post(handle_register))
        .route("/auth/login", post(handle_login))
        .route("/auth/logout", post(handle_logout))
        .route("/documents", get(handle_list).post(handle_upload))
        .route("/documents/{id}", get(handle_fetch).delete(handle_delete))
        .route("/documents/{id}/reindex", post(handle_reindex))
        .route("/documents/{id}/analyze", post(handle_analyze))
        .route("/query", post(handle_query))
        .route("/audit", get(handle_audit))
        .layer(cors)
        .with_state(state)
}

// ============ Sessions ============

struct Session {
    identity: Identity,
    last_seen: Instant,
}

/// In-memory bearer-token sessions with idle expiry.
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn create(&self, identity: Identity) -> String {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = hex::encode(raw);

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.ttl;
        sessions.retain(|_, s| s.last_seen.elapsed() < ttl);
        sessions.insert(
            token.clone(),
            Session {
                identity,
                last_seen: Instant::now(),
            },
        );
        token
    }

    /// Resolve a token, refreshing its idle timer. Expired tokens are dropped.
    pub fn resolve(&self, token: &str) -> Option<Identity> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match sessions.get_mut(token) {
            None => return None,
            Some(s) if s.last_seen.elapsed() >= self.ttl => true,
            Some(s) => {
                s.last_seen = Instant::now();
                return Some(s.identity.clone());
            }
        };
        if expired {
            sessions.remove(token);
        }
        None
    }

    pub fn revoke(&self, token: &str) -> Option<Identity> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(token).map(|s| s.identity)
    }
}

/// The caller behind a valid bearer token.
struct Authenticated {
    identity: Identity,
    token: String,
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .ok_or_else(unauthorized)?;

        let identity = state.sessions.resolve(&token).ok_or_else(unauthorized)?;
        Ok(Self { identity, token })
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        let status = match &err {
            VaultError::AuthenticationFailure => StatusCode::UNAUTHORIZED,
            VaultError::DuplicateUsername(_) => StatusCode::CONFLICT,
            VaultError::NotFound { .. } => StatusCode::NOT_FOUND,
            VaultError::Forbidden(_) => StatusCode::FORBIDDEN,
            VaultError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            VaultError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            VaultError::Embedding(_) | VaultError::Synthesis(_) | VaultError::IndexUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            VaultError::Decryption
            | VaultError::IntegrityMismatch(_)
            | VaultError::AuditWrite(_)
            | VaultError::Storage(_)
            | VaultError::Database(_)
            | VaultError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(code = err.code(), error = %err, "Request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.public_message(),
        }
    }
}

fn unauthorized() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: "Missing or expired bearer token".to_string(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /auth ============

#[derive(Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: Identity,
}

async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<Identity>), AppError> {
    let identity = state.vault.register(&req.username, &req.password).await?;
    Ok((StatusCode::CREATED, Json(identity)))
}

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let identity = state.vault.login(&req.username, &req.password).await?;
    let token = state.sessions.create(identity.clone());
    Ok(Json(LoginResponse {
        token,
        user: identity,
    }))
}

async fn handle_logout(State(state): State<AppState>, auth: Authenticated) -> StatusCode {
    state.sessions.revoke(&auth.token);
    state.vault.logout(&auth.identity).await;
    StatusCode::NO_CONTENT
}

// ============ /documents ============

#[derive(Deserialize)]
struct UploadRequest {
    filename: String,
    #[serde(default)]
    description: Option<String>,
    content_base64: String,
}

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<Document>,
}

#[derive(Serialize)]
struct FetchResponse {
    id: String,
    filename: String,
    content_base64: String,
}

#[derive(Serialize)]
struct ReindexResponse {
    document_id: String,
    chunks: usize,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    document_id: String,
    analysis: String,
}

async fn handle_list(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = state.vault.documents(&auth.identity).await?;
    Ok(Json(DocumentListResponse { documents }))
}

async fn handle_upload(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(req): Json<UploadRequest>,
) -> Result<(StatusCode, Json<UploadReport>), AppError> {
    let content = base64::engine::general_purpose::STANDARD
        .decode(req.content_base64.trim())
        .map_err(|_| bad_request("content_base64 is not valid base64"))?;
    let report = state
        .vault
        .upload(&auth.identity, &req.filename, &content, req.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn handle_fetch(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<FetchResponse>, AppError> {
    let (doc, plaintext) = state.vault.fetch(&id, &auth.identity).await?;
    Ok(Json(FetchResponse {
        id: doc.id,
        filename: doc.filename,
        content_base64: base64::engine::general_purpose::STANDARD.encode(&*plaintext),
    }))
}

async fn handle_delete(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.vault.delete(&id, &auth.identity).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_reindex(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ReindexResponse>, AppError> {
    let chunks = state.vault.reindex(&id, &auth.identity).await?;
    Ok(Json(ReindexResponse {
        document_id: id,
        chunks,
    }))
}

async fn handle_analyze(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let analysis = state.vault.analyze(&id, &auth.identity).await?;
    Ok(Json(AnalyzeResponse {
        document_id: id,
        analysis,
    }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

async fn handle_query(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryAnswer>, AppError> {
    Ok(Json(state.vault.ask(&req.question, &auth.identity).await?))
}

// ============ GET /audit ============

#[derive(Deserialize)]
struct AuditParams {
    #[serde(default = "default_audit_limit")]
    limit: usize,
    #[serde(default)]
    order: AuditOrder,
}

#[derive(Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum AuditOrder {
    Asc,
    #[default]
    Desc,
}

fn default_audit_limit() -> usize {
    50
}

#[derive(Serialize)]
struct AuditResponse {
    entries: Vec<AuditEntry>,
}

async fn handle_audit(
    State(state): State<AppState>,
    auth: Authenticated,
    Query(params): Query<AuditParams>,
) -> Result<Json<AuditResponse>, AppError> {
    let entries = state
        .vault
        .audit_entries(&auth.identity, params.limit, params.order == AuditOrder::Desc)
        .await?;
    Ok(Json(AuditResponse { entries }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexvault_core::models::Role;

    fn identity() -> Identity {
        Identity {
            user_id: "u1".into(),
            username: "alice".into(),
            role: Role::User,
        }
    }

    #[test]
    fn test_tokens_are_256_bit_hex() {
        let store = SessionStore::new(Duration::from_secs(60));
        let token = store.create(identity());
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, store.create(identity()));
    }

    #[test]
    fn test_resolve_and_revoke() {
        let store = SessionStore::new(Duration::from_secs(60));
        let token = store.create(identity());
        assert_eq!(store.resolve(&token).unwrap().username, "alice");
        assert!(store.revoke(&token).is_some());
        assert!(store.resolve(&token).is_none());
        assert!(store.resolve("nope").is_none());
    }

    #[test]
    fn test_idle_sessions_expire() {
        let store = SessionStore::new(Duration::ZERO);
        let token = store.create(identity());
        assert!(store.resolve(&token).is_none());
    }

    #[test]
    fn test_error_mapping() {
        let err: AppError = VaultError::Forbidden("d".into()).into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.code, "forbidden");

        let err: AppError = VaultError::Decryption.into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("tag"));
    }
}
