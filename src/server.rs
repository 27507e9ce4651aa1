use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::agent::AgentClient;
use crate::config::AppConfig;
use crate::error::RelayError;
use crate::session::{HandlerSettings, SessionHandler, SessionStore};
use crate::ui::{ChatSink, UiEvent, UiMessage, page::chat_page, sse::build_sse_response};

/// Author label for messages typed by the user.
pub const USER_AUTHOR: &str = "user";

/// Slack on top of the run timeout before the HTTP request itself is cut off.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

/// How often idle sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Build the application state around an agent client.
pub fn build_state(config: Arc<AppConfig>, client: Arc<dyn AgentClient>) -> AppState {
    let handler = Arc::new(SessionHandler::new(
        client,
        HandlerSettings::from_config(&config),
    ));
    AppState {
        handler,
        sessions: SessionStore::new(),
        config,
    }
}

/// Build the router with all routes and layers.
pub fn build_router(state: AppState) -> Router {
    let request_timeout =
        Duration::from_secs(state.config.agent.run_timeout_secs) + REQUEST_TIMEOUT_SLACK;

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/sessions", post(api_create_session).get(api_list_sessions))
        .route("/api/sessions/{id}", axum::routing::delete(api_delete_session))
        .route(
            "/api/sessions/{id}/messages",
            post(api_send_message).get(api_get_messages),
        )
        .route("/api/sessions/{id}/events", get(api_session_events))
        .layer(DefaultBodyLimit::max(64 * 1024))
        // Only bounds the time to a response head; SSE bodies stream past it.
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(request_timeout, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>, client: Arc<dyn AgentClient>) -> anyhow::Result<()> {
    info!(
        name: "agent.config.loaded",
        agent_id = %config.agent.agent_id,
        run_timeout_secs = config.agent.run_timeout_secs,
        "Agent configuration loaded"
    );

    let state = build_state(Arc::clone(&config), client);
    spawn_session_sweeper(
        state.sessions.clone(),
        Duration::from_secs(config.chat.session_idle_secs),
    );

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

fn spawn_session_sweeper(sessions: SessionStore, idle: Duration) {
    if idle.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = sessions.cleanup_expired_with_timeout(idle);
            if removed > 0 {
                info!(name: "session.expired", removed, remaining = sessions.len(), "Dropped idle sessions");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn index_handler() -> impl IntoResponse {
    Html(chat_page("Agent Chat"))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Error details returned alongside a rendered message.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDto {
    /// Error kind, e.g. `run_failed`.
    pub kind: String,
    /// Human-readable description.
    pub message: String,
}

impl From<&RelayError> for ErrorDto {
    fn from(err: &RelayError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Response from session-start.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStarted {
    pub session_id: String,
    /// Whether the session is already bound to a remote thread.
    pub thread_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDto>,
}

/// Session info for listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub thread_id: Option<String>,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Request body for message-received.
#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    /// User message content.
    content: String,
}

/// Response from message-received.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// The agent message as finally rendered (reply or `Error: ...`).
    pub message: UiMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDto>,
}

/// POST /api/sessions - Start a session.
async fn api_create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionStarted>) {
    let session = state.sessions.create();
    let mut ctx = session.lock().await;
    let result = state
        .handler
        .on_session_start(&mut ctx, session.channel())
        .await;

    tracing::info!(
        session_id = %session.id(),
        thread_id = ?ctx.thread_id(),
        "Session started"
    );

    (
        StatusCode::CREATED,
        Json(SessionStarted {
            session_id: session.id().to_string(),
            thread_ready: ctx.thread_id().is_some(),
            error: result.as_ref().err().map(ErrorDto::from),
        }),
    )
}

/// GET /api/sessions - List live sessions.
async fn api_list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    let sessions = state
        .sessions
        .list()
        .into_iter()
        .map(|s| SessionInfo {
            id: s.id().to_string(),
            thread_id: s.try_thread_id(),
            message_count: s.channel().len(),
            created_at: s.created_at(),
            last_activity: s.last_activity(),
        })
        .collect();
    Json(sessions)
}

/// DELETE /api/sessions/:id - End a session.
async fn api_delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    match state.sessions.remove(&id) {
        Some(_) => {
            tracing::info!(session_id = %id, "Session ended");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// POST /api/sessions/:id/messages - Relay a user message to the agent.
async fn api_send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let Some(session) = state.sessions.get(&id) else {
        return Err((StatusCode::NOT_FOUND, format!("Session {id} not found")));
    };
    if req.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message content cannot be empty".to_string()));
    }

    // Detached from the request: a dropped connection or the request timeout
    // must not cut the relay off before the placeholder is rewritten.
    let handler = Arc::clone(&state.handler);
    let relay_session = session.clone();
    let content = req.content;
    let outcome = tokio::spawn(async move {
        let mut ctx = relay_session.lock().await;
        relay_session.channel().send(USER_AUTHOR, &content);
        handler
            .on_message(&mut ctx, &content, relay_session.channel())
            .await
    })
    .await
    .map_err(|e| {
        tracing::error!(session_id = %id, error = %e, "Relay task failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Relay task failed".to_string(),
        )
    })?;

    let message = session.channel().get(&outcome.message_id).ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Rendered message disappeared".to_string(),
        )
    })?;

    Ok(Json(MessageResponse {
        message,
        error: outcome.error.as_ref().map(ErrorDto::from),
    }))
}

/// GET /api/sessions/:id/messages - Rendered transcript.
async fn api_get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<UiMessage>>, StatusCode> {
    match state.sessions.get(&id) {
        Some(session) => Ok(Json(session.channel().transcript())),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// GET /api/sessions/:id/events - SSE stream of chat changes.
async fn api_session_events(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(session) = state.sessions.get(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    session.touch();
    let stream = BroadcastStream::new(session.channel().subscribe())
        .filter_map(|res: Result<UiEvent, _>| res.ok());

    build_sse_response(stream).into_response()
}
