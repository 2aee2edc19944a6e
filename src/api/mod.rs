//! HTTP API server.
//!
//! Every route lives under `/api` except `/health`. Responses use the
//! `{"status": "success" | "error", ...}` envelope.

// Allow clippy lint triggered by utoipa's OpenApi derive macro
#![allow(clippy::needless_for_each)]

mod error;
mod handlers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{AgentFactory, LlmAgentFactory};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::ApiError;

use crate::config::Config;
use crate::core::storage::Storage;
use crate::core::{CancelRegister, SessionStore, StreamHub};

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub hub: Arc<StreamHub>,
    pub cancel: Arc<CancelRegister>,

    /// Idle time before the stream relay sends a keep-alive.
    pub keepalive: Duration,

    /// API token for authentication (if configured).
    pub token: Option<String>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<SessionStore>, keepalive: Duration, token: Option<String>) -> Self {
        Self {
            store,
            hub: Arc::new(StreamHub::new()),
            cancel: Arc::new(CancelRegister::new()),
            keepalive,
            token,
        }
    }

    /// Build the state for `config` with the LLM-backed agent factory.
    ///
    /// # Errors
    ///
    /// Returns an error if the data or working directory cannot be determined.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let factory: Arc<dyn AgentFactory> = Arc::new(LlmAgentFactory::new(
            config.agent.models.clone(),
            config.agent.max_tokens,
        ));
        let storage = Storage::with_root(config.sessions_dir()?);
        let project = project_binding(config)?;

        if let Some(path) = &project {
            tracing::info!(project = %path.display(), "default project");
        } else {
            tracing::info!("project binding deferred until initialize_project");
        }

        let store = SessionStore::new(storage, factory, project, config.agent.model.clone());
        Ok(Self::new(
            Arc::new(store),
            config.stream.keepalive(),
            config.api.token.clone(),
        ))
    }
}

fn project_binding(config: &Config) -> anyhow::Result<Option<PathBuf>> {
    if config.project.defer_init {
        return Ok(None);
    }
    match &config.project.default_path {
        Some(path) => Ok(Some(path.clone())),
        None => Ok(Some(std::env::current_dir()?)),
    }
}

/// `OpenAPI` documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "pairline API",
        description = "Session API for a streaming AI pair-programming agent",
        version = "0.1.0",
        license(name = "MIT")
    ),
    paths(
        handlers::health,
        handlers::init_session,
        handlers::send_message,
        handlers::stream_events,
        handlers::cancel_message,
        handlers::get_files,
        handlers::refresh_files,
        handlers::add_files,
        handlers::remove_files,
        handlers::add_web_page,
        handlers::undo_commit,
        handlers::clear_history,
        handlers::repo_file,
        handlers::run_command,
        handlers::set_mode,
        handlers::initialize_project,
        handlers::update_api_keys,
        handlers::update_model,
        handlers::get_available_models,
    ),
    components(schemas(
        handlers::SessionRequest,
        handlers::MessageRequest,
        handlers::FilesRequest,
        handlers::WebPageRequest,
        handlers::UndoRequest,
        handlers::CommandRequest,
        handlers::ModeRequest,
        handlers::InitProjectRequest,
        handlers::ApiKeysRequest,
        handlers::ModelRequest,
        crate::core::actions::FileLists,
        crate::core::actions::CommandOutput,
    ))
)]
struct ApiDoc;

/// Authentication middleware.
///
/// Validates the `Authorization: Bearer <token>` header if a token is configured.
async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    // If no token configured, allow all requests (localhost-only mode)
    let Some(expected_token) = state.token.as_deref() else {
        return next.run(request).await;
    };

    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match auth_header {
        Some(token) if token == expected_token => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "status": "error",
                "message": "Missing or invalid Authorization header. Use: Bearer <token>"
            })),
        )
            .into_response(),
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    // Protected routes (require auth if token configured)
    let protected_routes = Router::new()
        .route("/api/init", post(handlers::init_session))
        .route("/api/send_message", post(handlers::send_message))
        .route("/api/stream", get(handlers::stream_events))
        .route("/api/cancel_message", post(handlers::cancel_message))
        .route("/api/get_files", get(handlers::get_files))
        .route("/api/refresh_files", post(handlers::refresh_files))
        .route("/api/add_files", post(handlers::add_files))
        .route("/api/remove_files", post(handlers::remove_files))
        .route("/api/add_web_page", post(handlers::add_web_page))
        .route("/api/undo_commit", post(handlers::undo_commit))
        .route("/api/clear_history", post(handlers::clear_history))
        .route("/api/repo_file", get(handlers::repo_file))
        .route("/api/run_command", post(handlers::run_command))
        .route("/api/set_mode", post(handlers::set_mode))
        .route("/api/initialize_project", post(handlers::initialize_project))
        .route("/api/update_api_keys", post(handlers::update_api_keys))
        .route("/api/update_model", post(handlers::update_model))
        .route("/api/get_available_models", get(handlers::get_available_models))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()));

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Periodically drop idle sessions and event queues from memory.
pub fn spawn_eviction(state: AppState, idle_ttl: Duration, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let every = every.max(Duration::from_secs(1));
        let mut ticks = IntervalStream::new(tokio::time::interval(every));
        while ticks.next().await.is_some() {
            for session_id in state.store.evict_idle(idle_ttl) {
                state.hub.remove(&session_id);
                state.cancel.remove(&session_id);
            }
            state.hub.sweep_idle(idle_ttl);
        }
    })
}

/// Start the HTTP API server.
///
/// # Errors
///
/// Returns an error if the server fails to bind or start.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let auth_enabled = state.token.is_some();

    spawn_eviction(
        state.clone(),
        config.session.idle_ttl(),
        config.session.sweep_interval(),
    );

    let app = router(state);
    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    if auth_enabled {
        tracing::info!(addr = %addr, "starting HTTP API server (auth enabled)");
    } else {
        tracing::warn!(addr = %addr, "starting HTTP API server (NO AUTH - localhost only recommended)");
    }

    axum::serve(listener, app).await?;

    Ok(())
}
