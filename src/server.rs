//! HTTP surface.
//!
//! A thin JSON layer over [`AppContext`]: every handler delegates to the
//! library and maps typed errors to status codes through [`ErrorClass`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness (returns version) |
//! | `GET`  | `/api/init-status` | Readiness snapshot, component names, document count |
//! | `GET`  | `/api/system-status` | Backend and index status from the fast probe |
//! | `POST` | `/api/ingest` | Ingest the configured corpus |
//! | `POST` | `/api/chat` | `{message}` → `{response, sources}` |
//! | `GET`  | `/api/config` | Active chunking, retrieval, and temperature constants |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_ready", "message": "Still initializing. Please wait a moment and try again." } }
//! ```
//!
//! Codes: `not_ready` (503), `bad_request` (400), `rate_limited` (429),
//! `timeout` (504), `unprocessable` (422), `internal` (500). Rate-limited
//! responses carry `Retry-After`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::{admit_ingest, answer};
use crate::config::{Config, Introspection};
use crate::context::{spawn_initialization, AppContext, Core};
use crate::error::{ChatError, ErrorClass, IngestError, NotReady};
use crate::ingest::{ingest, IngestReport};
use crate::models::SourceFormat;
use crate::readiness::Status;
use crate::store::{index_file_presence, DocumentPresence};

/// Build the router over an existing context.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/init-status", get(handle_init_status))
        .route("/api/system-status", get(handle_system_status))
        .route("/api/ingest", post(handle_ingest))
        .route("/api/chat", post(handle_chat))
        .route("/api/config", get(handle_config))
        .layer(cors)
        .with_state(ctx)
}

/// Start initialization in the background and serve until Ctrl-C.
///
/// On shutdown the initialization task is cancelled and given at most
/// `workers.shutdown_grace_secs` to wind down.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let grace = Duration::from_secs(config.workers.shutdown_grace_secs);
    let ctx = Arc::new(AppContext::new(config));

    let token = CancellationToken::new();
    let bring_up_config = ctx.config.clone();
    let init = spawn_initialization(
        ctx.clone(),
        move || Core::bring_up(&bring_up_config),
        token.clone(),
    );

    let app = router(ctx);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Career Scout listening on http://{}", bind_addr);

    let shutdown = token.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
        tracing::info!("shutdown requested");
        shutdown.cancel();
    })
    .await?;

    token.cancel();
    if tokio::time::timeout(grace, init).await.is_err() {
        tracing::warn!(?grace, "initialization task did not stop within the grace period");
    }
    Ok(())
}

// ============ Client identity ============

/// Peer IP of the caller, or `"unknown"` when the transport does not say.
struct ClientId(String);

impl<S: Send + Sync> FromRequestParts<S> for ClientId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientId(id))
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    class: ErrorClass,
    message: String,
    retry_after: Option<Duration>,
}

impl AppError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self.class {
            ErrorClass::RetryLater => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
            ErrorClass::ClientError => (StatusCode::BAD_REQUEST, "bad_request"),
            ErrorClass::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            ErrorClass::GatewayTimeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            ErrorClass::Unprocessable => (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable"),
            ErrorClass::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.message,
            },
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(after) = self.retry_after {
            let secs = after.as_secs().max(1).to_string();
            if let Ok(value) = HeaderValue::from_str(&secs) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        let retry_after = match &err {
            ChatError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        };
        if err.class() == ErrorClass::Internal {
            tracing::error!(error = %err, "chat request failed");
        }
        AppError {
            class: err.class(),
            message: err.to_string(),
            retry_after,
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let retry_after = match &err {
            IngestError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        };
        if err.class() == ErrorClass::Internal {
            tracing::error!(error = %err, "ingestion failed");
        }
        AppError {
            class: err.class(),
            message: err.to_string(),
            retry_after,
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

// ============ GET /api/init-status ============

#[derive(Serialize)]
struct Components {
    tokenizer: String,
    embedding_model: String,
    llm_model: String,
}

#[derive(Serialize)]
struct InitStatusResponse {
    status: Status,
    core_ready: bool,
    documents_ready: bool,
    error_message: Option<String>,
    /// Present once core bring-up has finished.
    components: Option<Components>,
    /// Best-effort; `None` when the probe fails or the core is not up.
    document_count: Option<usize>,
}

async fn handle_init_status(State(ctx): State<Arc<AppContext>>) -> Json<InitStatusResponse> {
    let snapshot = ctx.readiness.snapshot();
    let core = ctx.core();

    let components = core.as_ref().map(|core| Components {
        tokenizer: core.budget.tokenizer_name().to_string(),
        embedding_model: core.embedder.model_name().to_string(),
        llm_model: core.llm.model_name().to_string(),
    });
    let document_count = match core {
        Some(_) => probe(&ctx).await.map(|p| p.approx_count),
        None => None,
    };

    Json(InitStatusResponse {
        status: snapshot.status,
        core_ready: snapshot.core_ready,
        documents_ready: snapshot.documents_ready,
        error_message: snapshot.error_message,
        components,
        document_count,
    })
}

/// Fast existence probe through the core store, or the index file when
/// the core is not up yet.
async fn probe(ctx: &AppContext) -> Option<DocumentPresence> {
    let Some(core) = ctx.core() else {
        return Some(index_file_presence(&ctx.config.store.index_file()));
    };
    let store = core.store.clone();
    match ctx
        .workers
        .run("document probe", ctx.config.retrieval.probe_timeout(), async move {
            store.probe().await
        })
        .await
    {
        Ok(Ok(presence)) => Some(presence),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "document probe failed");
            None
        }
        Err(_) => None,
    }
}

// ============ GET /api/system-status ============

#[derive(Serialize)]
struct SystemStatusResponse {
    status: String,
    backend: String,
    database: String,
    documents: usize,
}

async fn handle_system_status(State(ctx): State<Arc<AppContext>>) -> Json<SystemStatusResponse> {
    let (database, documents) = match probe(&ctx).await {
        Some(p) if p.exists => ("connected", p.approx_count),
        Some(_) => ("empty", 0),
        None => ("unavailable", 0),
    };
    let backend = match ctx.readiness.snapshot().status {
        Status::Ready => "healthy",
        Status::Failed => "degraded",
        Status::NotStarted | Status::Initializing => "starting",
    };

    Json(SystemStatusResponse {
        status: "online".to_string(),
        backend: backend.to_string(),
        database: database.to_string(),
        documents,
    })
}

// ============ POST /api/ingest ============

#[derive(Serialize)]
struct IngestResponse {
    status: String,
    message: String,
    documents: usize,
    chunks: usize,
    batches: usize,
    failed_formats: Vec<SourceFormat>,
}

impl From<IngestReport> for IngestResponse {
    fn from(report: IngestReport) -> Self {
        IngestResponse {
            status: "success".to_string(),
            message: format!(
                "Ingested {} chunks from {} documents",
                report.chunks, report.documents
            ),
            documents: report.documents,
            chunks: report.chunks,
            batches: report.batches,
            failed_formats: report.failed_formats,
        }
    }
}

async fn handle_ingest(
    State(ctx): State<Arc<AppContext>>,
    ClientId(client): ClientId,
) -> Result<Json<IngestResponse>, AppError> {
    admit_ingest(&ctx, &client)?;
    let core = ctx
        .core()
        .ok_or(IngestError::NotReady(NotReady::CoreUnavailable))?;

    tracing::info!(client = %client, root = %ctx.config.corpus.root.display(), "ingestion requested");
    let report = ingest(
        core.store.clone(),
        &ctx.workers,
        &ctx.config,
        &ctx.config.corpus.root,
    )
    .await?;
    ctx.readiness.mark_documents_ready();

    Ok(Json(report.into()))
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    sources: Vec<String>,
}

async fn handle_chat(
    State(ctx): State<Arc<AppContext>>,
    ClientId(client): ClientId,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let reply = answer(&ctx, &client, &req.message).await?;
    Ok(Json(ChatResponse {
        response: reply.answer,
        sources: reply.sources,
    }))
}

// ============ GET /api/config ============

async fn handle_config(State(ctx): State<Arc<AppContext>>) -> Json<Introspection> {
    Json(ctx.config.introspect())
}
