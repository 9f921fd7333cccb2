//! HTTP API surface.
//!
//! | Method   | Path                              | Description |
//! |----------|-----------------------------------|-------------|
//! | `POST`   | `/api/v1/repositories`            | Register a repository and start ingestion |
//! | `GET`    | `/api/v1/repositories`            | List repositories, newest first |
//! | `GET`    | `/api/v1/repositories/{id}/status`| Processing status for one repository |
//! | `DELETE` | `/api/v1/repositories/{id}`       | Remove a repository and its vectors |
//! | `POST`   | `/api/v1/chat`                    | Ask a question against a READY repository |
//! | `GET`    | `/health`                         | Health check |
//!
//! Ingestion is triggered asynchronously: the create handler returns as soon
//! as the repository row exists, and the spawned run advances its status in
//! the background. Errors use the JSON shape
//! `{ "error": { "code": "...", "message": "..." } }`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::{ChatEngine, ChatOutcome};
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::index::VectorIndex;
use crate::ingest::Orchestrator;
use crate::models::{RepoStatus, Repository};
use crate::repos::RepoStore;
use crate::retrieve::retrieve;
use crate::{acquire::GitAcquirer, db, migrate};

/// Shared application state; every field is cheap to clone.
#[derive(Clone)]
struct AppState {
    repos: RepoStore,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    chat: Arc<ChatEngine>,
    orchestrator: Orchestrator,
    top_k: usize,
}

/// Wire up all services from config and serve until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let repos = RepoStore::new(pool.clone());
    let embedder = create_embedder(&config.embedding)?;
    let index = VectorIndex::open(pool, embedder.dims()).await?;
    let acquirer = Arc::new(GitAcquirer::new(config.acquisition.scratch_dir.clone()));
    let orchestrator = Orchestrator::new(
        repos.clone(),
        index.clone(),
        embedder.clone(),
        acquirer,
        config.chunking.max_chunk_size,
        config.embedding.batch_size,
    );
    let chat = Arc::new(ChatEngine::from_env(config.chat.model.clone()));

    let state = AppState {
        repos,
        index,
        embedder,
        chat,
        orchestrator,
        top_k: config.retrieval.top_k,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route(
            "/api/v1/repositories",
            post(handle_create_repository).get(handle_list_repositories),
        )
        .route(
            "/api/v1/repositories/{id}/status",
            get(handle_repository_status),
        )
        .route("/api/v1/repositories/{id}", delete(handle_delete_repository))
        .route("/api/v1/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    let bind_addr = &config.server.bind;
    tracing::info!(bind = %bind_addr, "API server listening");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
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
    code: String,
    message: String,
}

struct AppError {
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ POST /api/v1/repositories ============

#[derive(Deserialize)]
struct CreateRepositoryRequest {
    name: String,
    github_url: String,
}

fn valid_github_url(url: &str) -> bool {
    url.starts_with("https://github.com/") || url.starts_with("git@github.com:")
}

async fn handle_create_repository(
    State(state): State<AppState>,
    Json(req): Json<CreateRepositoryRequest>,
) -> Result<Json<Repository>, AppError> {
    if req.name.trim().is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    if !valid_github_url(&req.github_url) {
        return Err(bad_request("Invalid GitHub URL"));
    }

    if let Some(existing) = state
        .repos
        .find_by_url(&req.github_url)
        .await
        .map_err(|e| internal(e.to_string()))?
    {
        return Err(bad_request(format!(
            "Repository already exists with ID: {}",
            existing.id
        )));
    }

    let repo = state
        .repos
        .create(&req.name, &req.github_url)
        .await
        .map_err(|e| internal(e.to_string()))?;

    tracing::info!(repository_id = repo.id, url = %repo.github_url, "repository registered");

    // Fire-and-forget: the run reaches a terminal status on its own.
    state.orchestrator.spawn(repo.id);

    Ok(Json(repo))
}

// ============ GET /api/v1/repositories ============

async fn handle_list_repositories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Repository>>, AppError> {
    let repos = state
        .repos
        .list()
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(repos))
}

// ============ GET /api/v1/repositories/{id}/status ============

#[derive(Serialize)]
struct StatusResponse {
    id: i64,
    name: String,
    github_url: String,
    status: RepoStatus,
    error_message: Option<String>,
    created_at: i64,
    updated_at: i64,
    is_ready_for_chat: bool,
}

async fn handle_repository_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StatusResponse>, AppError> {
    let repo = state
        .repos
        .get(id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| not_found("Repository not found"))?;

    Ok(Json(StatusResponse {
        id: repo.id,
        name: repo.name,
        github_url: repo.github_url,
        status: repo.status,
        error_message: repo.error_message,
        created_at: repo.created_at,
        updated_at: repo.updated_at,
        is_ready_for_chat: repo.status == RepoStatus::Ready,
    }))
}

// ============ DELETE /api/v1/repositories/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    message: String,
}

async fn handle_delete_repository(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, AppError> {
    let repo = state
        .repos
        .get(id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| not_found("Repository not found"))?;

    // Vector cleanup is best-effort; the registry row is removed regardless.
    if let Err(e) = state.index.delete_partition(repo.id).await {
        tracing::warn!(repository_id = repo.id, error = %e, "failed to delete vector partition");
    }

    state
        .repos
        .delete(repo.id)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(DeleteResponse {
        message: "Repository deleted successfully".to_string(),
    }))
}

// ============ POST /api/v1/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
    repository_id: i64,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatOutcome>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let repo = state
        .repos
        .get(req.repository_id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| not_found("Repository not found"))?;

    if repo.status != RepoStatus::Ready {
        let message = match repo.status {
            RepoStatus::Pending => "Repository is pending processing.".to_string(),
            RepoStatus::Processing => "Repository is currently being processed.".to_string(),
            RepoStatus::Failed => format!(
                "Repository processing failed: {}",
                repo.error_message.as_deref().unwrap_or("unknown error")
            ),
            RepoStatus::Ready => unreachable!(),
        };
        return Err(bad_request(message));
    }

    let chunks = retrieve(
        state.embedder.as_ref(),
        &state.index,
        repo.id,
        &req.query,
        state.top_k,
    )
    .await
    .map_err(|e| internal(format!("Failed to process chat request: {}", e)))?;

    if chunks.is_empty() {
        return Ok(Json(ChatOutcome {
            response: "I couldn't find any relevant code chunks for your question. \
                       Try asking about something more specific to this repository."
                .to_string(),
            sources: Vec::new(),
            context_chunks_used: 0,
            repository_name: repo.name,
            model_used: "no_results".to_string(),
            success: false,
        }));
    }

    let outcome = state
        .chat
        .generate_response(&req.query, &chunks, &repo.name)
        .await;

    Ok(Json(outcome))
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
