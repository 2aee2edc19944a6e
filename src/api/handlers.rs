//! Route handlers for the session API.

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use agent_core::{ChatMode, ReasoningEffort, SwitchOptions};
use axum::{
    Json,
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::{IntoParams, ToSchema};

use super::AppState;
use super::error::ApiError;
use crate::core::stream::{CONNECTED, KEEP_ALIVE};
use crate::core::{Error, StreamEvent, actions, driver, switch, web};

const SESSION_REQUIRED: &str = "Session ID is required";

type ApiResult = Result<Json<Value>, ApiError>;

fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(message))
}

/// `{"status": "success"}` merged with the fields of `body`.
fn success<T: Serialize>(body: &T) -> Json<Value> {
    let mut value = serde_json::to_value(body).unwrap_or_else(|_| json!({}));
    if let Some(map) = value.as_object_mut() {
        map.insert("status".to_string(), json!("success"));
    }
    Json(value)
}

fn ok() -> Json<Value> {
    Json(json!({ "status": "success" }))
}

/// Request carrying only a session id.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct SessionRequest {
    pub session_id: Option<String>,
}

/// Session id as a query parameter.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct MessageRequest {
    pub session_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct FilesRequest {
    pub session_id: Option<String>,
    pub files: Vec<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct WebPageRequest {
    pub session_id: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct UndoRequest {
    pub session_id: Option<String>,
    pub commit_hash: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct RepoFileQuery {
    pub file_name: Option<String>,
    /// Read from this session's project instead of the bound one.
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CommandRequest {
    pub session_id: Option<String>,
    pub command: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ModeRequest {
    pub session_id: Option<String>,
    /// One of `code`, `architect`, `ask`, `context`.
    pub mode: Option<String>,
    pub architect_model: Option<String>,
    #[schema(value_type = Option<String>)]
    pub reasoning_effort: Option<ReasoningEffort>,
    pub thinking_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct InitProjectRequest {
    pub session_id: Option<String>,
    pub project_path: Option<String>,
    /// Provider name to API key.
    pub api_keys: HashMap<String, String>,
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ApiKeysRequest {
    pub api_keys: HashMap<String, String>,
    /// Rebuild this session's agent with the new keys.
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ModelRequest {
    pub session_id: Option<String>,
    pub model: Option<String>,
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service healthy"))
)]
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::build_info::version_string(),
    }))
}

/// Create or load a session and return its transcript and files.
#[utoipa::path(
    post,
    path = "/api/init",
    request_body = SessionRequest,
    responses(
        (status = 200, description = "Session ready"),
        (status = 400, description = "Missing session id"),
        (status = 500, description = "Session could not be initialized")
    )
)]
pub async fn init_session(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> ApiResult {
    let session_id = required(req.session_id, SESSION_REQUIRED)?;
    let handle = state.store.get_or_create(&session_id).await?;
    state.hub.create(&session_id);

    let session = handle.lock().await;
    Ok(success(&json!({
        "messages": session.transcript(),
        "files": session.files(),
    })))
}

/// Start a turn. Events arrive on `/api/stream`.
#[utoipa::path(
    post,
    path = "/api/send_message",
    request_body = MessageRequest,
    responses(
        (status = 200, description = "Turn started"),
        (status = 400, description = "Missing session id or message"),
        (status = 409, description = "A turn is already running")
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<MessageRequest>,
) -> ApiResult {
    const REQUIRED: &str = "Session ID and message are required";
    let session_id = required(req.session_id, REQUIRED)?;
    let message = required(req.message, REQUIRED)?;

    let handle = state.store.get_or_create(&session_id).await?;
    let mut session = handle
        .try_lock_owned()
        .map_err(|_| Error::Busy(session_id.clone()))?;

    session.record_input(message.clone());
    let cancel = state.cancel.begin_turn(&session_id);
    state.hub.create(&session_id);

    tracing::info!(session_id = %session_id, "accepted message");
    driver::spawn_turn(
        Arc::clone(&state.store),
        Arc::clone(&state.hub),
        session,
        cancel,
        message,
    );

    Ok(ok())
}

fn keep_alive() -> Event {
    Event::default().event(KEEP_ALIVE).data("{}")
}

/// Server-sent event relay for a session.
///
/// Sends `connected` first, then every published event. A `keep-alive`
/// follows each `message_complete` and fills idle periods.
#[utoipa::path(
    get,
    path = "/api/stream",
    params(SessionQuery),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 400, description = "Missing session id")
    )
)]
pub async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session_id = required(query.session_id, SESSION_REQUIRED)?;
    state.hub.create(&session_id);

    let hub = Arc::clone(&state.hub);
    let keepalive = state.keepalive;
    tracing::debug!(session_id = %session_id, "stream client attached");

    let stream = async_stream::stream! {
        let connected = json!({ "session_id": session_id }).to_string();
        yield Ok::<_, Infallible>(Event::default().event(CONNECTED).data(connected));

        loop {
            match hub.consume(&session_id, keepalive).await {
                Some(event) => {
                    let complete = matches!(event, StreamEvent::Complete { .. });
                    let data = event.payload(&session_id).to_string();
                    yield Ok(Event::default().event(event.name()).data(data));
                    if complete {
                        yield Ok(keep_alive());
                    }
                }
                None => yield Ok(keep_alive()),
            }
        }
    };

    Ok(Sse::new(stream))
}

/// Ask the running turn to stop at its next chunk.
#[utoipa::path(
    post,
    path = "/api/cancel_message",
    request_body = SessionRequest,
    responses((status = 200, description = "Cancellation requested"))
)]
pub async fn cancel_message(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> ApiResult {
    let session_id = required(req.session_id, SESSION_REQUIRED)?;
    state.cancel.request_cancel(&session_id);
    Ok(ok())
}

/// Tracked and in-chat files.
#[utoipa::path(
    get,
    path = "/api/get_files",
    params(SessionQuery),
    responses((status = 200, description = "File lists", body = actions::FileLists))
)]
pub async fn get_files(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> ApiResult {
    let session_id = required(query.session_id, SESSION_REQUIRED)?;
    let handle = state.store.get_or_create(&session_id).await?;
    let session = handle.lock().await;
    let files = actions::list_files(&session).await?;
    Ok(success(&files))
}

/// File lists plus a `refresh_files` event for the attached client.
#[utoipa::path(
    post,
    path = "/api/refresh_files",
    request_body = SessionRequest,
    responses((status = 200, description = "File lists", body = actions::FileLists))
)]
pub async fn refresh_files(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> ApiResult {
    let session_id = required(req.session_id, SESSION_REQUIRED)?;
    let handle = state.store.get_or_create(&session_id).await?;
    let session = handle.lock().await;
    let files = actions::refresh_files(&session, &state.hub).await?;
    Ok(success(&files))
}

#[utoipa::path(
    post,
    path = "/api/add_files",
    request_body = FilesRequest,
    responses((status = 200, description = "Files added"))
)]
pub async fn add_files(State(state): State<AppState>, Json(req): Json<FilesRequest>) -> ApiResult {
    let session_id = required(req.session_id, SESSION_REQUIRED)?;
    let handle = state.store.get_or_create(&session_id).await?;
    let mut session = handle.lock().await;

    let added = actions::add_files(&mut session, &req.files);
    state.store.save(&session)?;
    Ok(success(&json!({ "added_files": added })))
}

#[utoipa::path(
    post,
    path = "/api/remove_files",
    request_body = FilesRequest,
    responses((status = 200, description = "Files removed"))
)]
pub async fn remove_files(
    State(state): State<AppState>,
    Json(req): Json<FilesRequest>,
) -> ApiResult {
    let session_id = required(req.session_id, SESSION_REQUIRED)?;
    let handle = state.store.get_or_create(&session_id).await?;
    let mut session = handle.lock().await;

    let removed = actions::remove_files(&mut session, &req.files);
    state.store.save(&session)?;
    Ok(success(&json!({ "removed_files": removed })))
}

/// Fetch a page and add its text to the chat.
#[utoipa::path(
    post,
    path = "/api/add_web_page",
    request_body = WebPageRequest,
    responses(
        (status = 200, description = "Page added"),
        (status = 404, description = "No content at the URL")
    )
)]
pub async fn add_web_page(
    State(state): State<AppState>,
    Json(req): Json<WebPageRequest>,
) -> ApiResult {
    const REQUIRED: &str = "Session ID and URL are required";
    let session_id = required(req.session_id, REQUIRED)?;
    let url = required(req.url, REQUIRED)?;

    let handle = state.store.get_or_create(&session_id).await?;
    let content = web::fetch_page(&url).await?;

    let mut session = handle.lock().await;
    let entry = actions::add_web_page(&mut session, &url, &content)?;
    state.store.save(&session)?;
    Ok(success(&json!({ "content": entry })))
}

/// Revert the latest agent commit.
#[utoipa::path(
    post,
    path = "/api/undo_commit",
    request_body = UndoRequest,
    responses(
        (status = 200, description = "Commit reverted"),
        (status = 400, description = "Not the latest commit")
    )
)]
pub async fn undo_commit(
    State(state): State<AppState>,
    Json(req): Json<UndoRequest>,
) -> ApiResult {
    const REQUIRED: &str = "Session ID and commit hash are required";
    let session_id = required(req.session_id, REQUIRED)?;
    let hash = required(req.commit_hash, REQUIRED)?;

    let handle = state.store.get_or_create(&session_id).await?;
    let mut session = handle.lock().await;
    let message = actions::undo_commit(&mut session, &hash).await?;
    state.store.save(&session)?;
    Ok(success(&json!({ "message": message })))
}

#[utoipa::path(
    post,
    path = "/api/clear_history",
    request_body = SessionRequest,
    responses((status = 200, description = "History cleared"))
)]
pub async fn clear_history(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> ApiResult {
    let session_id = required(req.session_id, SESSION_REQUIRED)?;
    let handle = state.store.get_or_create(&session_id).await?;
    let mut session = handle.lock().await;

    actions::clear_history(&mut session);
    state.store.save(&session)?;
    Ok(ok())
}

/// Read a file from the project.
#[utoipa::path(
    get,
    path = "/api/repo_file",
    params(RepoFileQuery),
    responses(
        (status = 200, description = "File content"),
        (status = 404, description = "File not found")
    )
)]
pub async fn repo_file(
    State(state): State<AppState>,
    Query(query): Query<RepoFileQuery>,
) -> ApiResult {
    let file_name = required(query.file_name, "File name is required")?;

    let session_root = match query.session_id.as_deref().and_then(|id| state.store.get(id)) {
        Some(handle) => Some(handle.lock().await.project_root().to_path_buf()),
        None => None,
    };
    let root = session_root
        .or_else(|| state.store.project())
        .ok_or_else(|| Error::Init("no project initialized".to_string()))?;

    let content = actions::repo_file(&root, &file_name).await?;
    Ok(success(&json!({ "file_content": content })))
}

/// Run a shell command in the project root.
#[utoipa::path(
    post,
    path = "/api/run_command",
    request_body = CommandRequest,
    responses((status = 200, description = "Command output", body = actions::CommandOutput))
)]
pub async fn run_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> ApiResult {
    const REQUIRED: &str = "Session ID and command are required";
    let session_id = required(req.session_id, REQUIRED)?;
    let command = required(req.command, REQUIRED)?;

    let handle = state.store.get_or_create(&session_id).await?;
    let root = handle.lock().await.project_root().to_path_buf();
    // The session stays unlocked while the shell runs.
    let output = actions::run_command(&root, &command, actions::COMMAND_TIMEOUT).await?;

    let mut session = handle.lock().await;
    actions::record_command(&mut session, &command, &output);
    state.store.save(&session)?;
    Ok(success(&output))
}

/// Switch the operating mode.
#[utoipa::path(
    post,
    path = "/api/set_mode",
    request_body = ModeRequest,
    responses(
        (status = 200, description = "Mode switched"),
        (status = 400, description = "Unknown mode"),
        (status = 500, description = "Agent could not be rebuilt")
    )
)]
pub async fn set_mode(State(state): State<AppState>, Json(req): Json<ModeRequest>) -> ApiResult {
    const REQUIRED: &str = "Session ID and mode are required";
    let session_id = required(req.session_id, REQUIRED)?;
    let mode: ChatMode = required(req.mode, REQUIRED)?
        .parse()
        .map_err(ApiError::bad_request)?;
    let options = SwitchOptions {
        architect_model: req.architect_model.filter(|m| !m.is_empty()),
        reasoning_effort: req.reasoning_effort,
        thinking_tokens: req.thinking_tokens,
    };

    let handle = state.store.get_or_create(&session_id).await?;
    let mut session = handle.lock().await;
    switch::switch_mode(&mut session, state.store.factory().as_ref(), mode, options).await?;
    state.store.save(&session)?;

    Ok(success(&json!({
        "mode": mode,
        "edit_format": session.agent().edit_format(),
    })))
}

/// Bind a project and rebuild the session from scratch.
#[utoipa::path(
    post,
    path = "/api/initialize_project",
    request_body = InitProjectRequest,
    responses(
        (status = 200, description = "Project initialized"),
        (status = 500, description = "Invalid project or agent failure")
    )
)]
pub async fn initialize_project(
    State(state): State<AppState>,
    Json(req): Json<InitProjectRequest>,
) -> ApiResult {
    const REQUIRED: &str = "Session ID and project path are required";
    let session_id = required(req.session_id, REQUIRED)?;
    let project_path = required(req.project_path, REQUIRED)?;

    let handle = state
        .store
        .initialize_project(
            &session_id,
            Path::new(&project_path),
            req.model.filter(|m| !m.is_empty()),
            req.api_keys,
            &state.cancel,
        )
        .await?;
    state.hub.create(&session_id);

    let session = handle.lock().await;
    Ok(success(&json!({
        "messages": session.transcript(),
        "files": session.files(),
    })))
}

/// Replace provider API keys.
#[utoipa::path(
    post,
    path = "/api/update_api_keys",
    request_body = ApiKeysRequest,
    responses((status = 200, description = "Keys updated"))
)]
pub async fn update_api_keys(
    State(state): State<AppState>,
    Json(req): Json<ApiKeysRequest>,
) -> ApiResult {
    if req.api_keys.is_empty() {
        return Err(ApiError::bad_request("API keys are required"));
    }
    let providers: Vec<String> = req.api_keys.keys().cloned().collect();
    state.store.factory().set_credentials(req.api_keys);
    tracing::info!(providers = ?providers, "updated API keys");

    if let Some(handle) = req.session_id.as_deref().and_then(|id| state.store.get(id)) {
        let mut session = handle.lock().await;
        let model = session.model().to_string();
        switch::switch_model(&mut session, &state.store, &model).await?;
        state.store.save(&session)?;
    }
    Ok(ok())
}

/// Switch the session to another model.
#[utoipa::path(
    post,
    path = "/api/update_model",
    request_body = ModelRequest,
    responses(
        (status = 200, description = "Model switched"),
        (status = 500, description = "Agent could not be built")
    )
)]
pub async fn update_model(
    State(state): State<AppState>,
    Json(req): Json<ModelRequest>,
) -> ApiResult {
    const REQUIRED: &str = "Session ID and model are required";
    let session_id = required(req.session_id, REQUIRED)?;
    let model = required(req.model, REQUIRED)?;

    let handle = state.store.get_or_create(&session_id).await?;
    let mut session = handle.lock().await;
    switch::switch_model(&mut session, &state.store, &model).await?;
    state.store.save(&session)?;
    Ok(success(&json!({ "model": model })))
}

#[utoipa::path(
    get,
    path = "/api/get_available_models",
    responses((status = 200, description = "Model ids"))
)]
pub async fn get_available_models(State(state): State<AppState>) -> ApiResult {
    Ok(success(&json!({
        "models": state.store.factory().models(),
        "default_model": state.store.default_model(),
    })))
}
