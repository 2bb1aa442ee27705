//! HTTP API server.
//!
//! Exposes import, agent management, and retrieval as a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/documents` | Import a document |
//! | `GET`  | `/documents/{id}` | Fetch a document with its chunks |
//! | `DELETE` | `/documents/{id}` | Delete a document (chunks cascade) |
//! | `POST` | `/agents` | Create or update an agent |
//! | `GET`  | `/agents` | List agents |
//! | `POST` | `/retrieve` | Agent-scoped retrieval query |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "content must not be empty" } }
//! ```
//!
//! Codes map 1:1 from the library error kinds: `bad_request` (400),
//! `not_found` (404), `configuration` (500), `provider_unavailable` (502),
//! `insert_failed` (500), `internal` (500). Malformed JSON bodies and
//! missing required fields are rejected with `bad_request`; requests with
//! the wrong method on a route get axum's 405 Method Not Allowed.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::Error;
use crate::import::{ImportOutcome, Importer};
use crate::models::{Agent, RetrievedChunk};
use crate::retrieve::Retriever;
use crate::store::Store;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(
    config: &Config,
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        provider,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/documents", post(handle_import))
        .route(
            "/documents/{id}",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route("/agents", post(handle_upsert_agent).get(handle_list_agents))
        .route("/retrieve", post(handle_retrieve))
        .layer(cors)
        .with_state(state);

    info!(addr = %bind_addr, "server listening");
    println!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

/// Maps library error kinds to HTTP responses without collapsing them
/// into opaque strings.
impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            Error::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
            Error::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_unavailable"),
            Error::Insert(_) => (StatusCode::INTERNAL_SERVER_ERROR, "insert_failed"),
            Error::Storage(_) | Error::Serialization(_) | Error::DimensionMismatch { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
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

// ============ POST /documents ============

#[derive(Deserialize)]
struct ImportRequest {
    content: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    source_id: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ImportResponse {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_id: Option<String>,
    chunks: usize,
}

async fn handle_import(
    State(state): State<AppState>,
    payload: Result<Json<ImportRequest>, JsonRejection>,
) -> Result<Json<ImportResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;

    let importer = Importer::new(
        state.store.clone(),
        state.provider.clone(),
        state.config.chunking.max_tokens,
    );

    let outcome = importer
        .import_document(
            req.source_id.as_deref(),
            req.title.as_deref(),
            &req.content,
            req.metadata.unwrap_or_else(|| serde_json::json!({})),
        )
        .await?;

    let response = match outcome {
        ImportOutcome::Empty => ImportResponse {
            outcome: "empty",
            document_id: None,
            chunks: 0,
        },
        ImportOutcome::Unchanged { document_id } => ImportResponse {
            outcome: "unchanged",
            document_id: Some(document_id),
            chunks: 0,
        },
        ImportOutcome::Imported { document_id, chunks } => ImportResponse {
            outcome: "imported",
            document_id: Some(document_id),
            chunks,
        },
    };
    Ok(Json(response))
}

// ============ GET /documents/{id} ============

#[derive(Serialize)]
struct DocumentResponse {
    id: String,
    source_id: Option<String>,
    title: Option<String>,
    content: String,
    created_at: i64,
    updated_at: i64,
    metadata: serde_json::Value,
    chunks: Vec<ChunkResponse>,
}

#[derive(Serialize)]
struct ChunkResponse {
    id: String,
    sequence: i64,
    content: String,
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, AppError> {
    let doc = state
        .store
        .get_document(&id)
        .await?
        .ok_or_else(|| Error::not_found("document", &id))?;

    let chunks = state.store.chunks_for_document(&id).await?;

    Ok(Json(DocumentResponse {
        id: doc.id,
        source_id: doc.source_id,
        title: doc.title,
        content: doc.content,
        created_at: doc.created_at,
        updated_at: doc.updated_at,
        metadata: doc.metadata,
        chunks: chunks
            .into_iter()
            .map(|c| ChunkResponse {
                id: c.id,
                sequence: c.sequence,
                content: c.content,
            })
            .collect(),
    }))
}

// ============ DELETE /documents/{id} ============

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let removed = state.store.delete_document(&id).await?;
    if !removed {
        return Err(Error::not_found("document", &id).into());
    }
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// ============ POST /agents, GET /agents ============

#[derive(Deserialize)]
struct AgentRequest {
    name: String,
    #[serde(default)]
    knowledge_document_ids: Vec<String>,
}

async fn handle_upsert_agent(
    State(state): State<AppState>,
    payload: Result<Json<AgentRequest>, JsonRejection>,
) -> Result<Json<Agent>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    let agent =
        crate::agents::create_agent(state.store.as_ref(), &req.name, req.knowledge_document_ids)
            .await?;
    Ok(Json(agent))
}

#[derive(Serialize)]
struct AgentListResponse {
    agents: Vec<Agent>,
}

async fn handle_list_agents(
    State(state): State<AppState>,
) -> Result<Json<AgentListResponse>, AppError> {
    let agents = state.store.list_agents().await?;
    Ok(Json(AgentListResponse { agents }))
}

// ============ POST /retrieve ============

#[derive(Deserialize)]
struct RetrieveRequest {
    agent: String,
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct RetrieveResponse {
    results: Vec<RetrievedChunk>,
}

async fn handle_retrieve(
    State(state): State<AppState>,
    payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Json<RetrieveResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;

    if req.top_k == Some(0) {
        return Err(bad_request("top_k must be >= 1"));
    }

    let retriever = Retriever::new(
        state.store.clone(),
        state.provider.clone(),
        state.config.retrieval.top_k,
    );
    let results = retriever.retrieve(&req.agent, &req.query, req.top_k).await?;
    Ok(Json(RetrieveResponse { results }))
}
