//! HTTP and WebSocket routes

use crate::dispatch::{self, DispatchEnd, Pacing};
use crate::session::{ReplaySession, SessionSummary};
use crate::state::{is_valid_name, AppState};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/session/:session_key/:artifact", get(session_artifact))
        .route("/ws/:session_key", get(live_stream))
        .route("/api/sessions/:session_key/summary", get(session_summary))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn not_found(what: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{} not found", what))
}

// === Static Session Data ===

/// Persisted JSON document, returned verbatim
async fn session_artifact(
    State(state): State<AppState>,
    Path((session_key, artifact)): Path<(String, String)>,
) -> Result<Response, (StatusCode, String)> {
    if !is_valid_name(&session_key) || !is_valid_name(&artifact) {
        return Err(not_found("File"));
    }

    let path = state
        .sessions
        .session_dir(&session_key)
        .join(format!("{}.json", artifact));
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::debug!("{}: {}", path.display(), e);
        not_found("File")
    })?;

    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

async fn session_summary(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Result<Json<SessionSummary>, (StatusCode, String)> {
    let session = state
        .sessions
        .get(&session_key)
        .await
        .ok_or_else(|| not_found(format!("Session {}", session_key)))?;
    Ok(Json(session.summary()))
}

// === Live Stream ===

/// Unknown sessions are refused with 404 before the upgrade
async fn live_stream(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(session) = state.sessions.get(&session_key).await else {
        return not_found(format!("Session {}", session_key)).into_response();
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let pacing = Pacing {
        tick: state.config.tick,
        heartbeat: state.config.heartbeat,
    };
    let cancel = state.shutdown.child_token();
    ws.on_upgrade(move |socket| stream_session(socket, session, pacing, cancel))
}

async fn stream_session(
    socket: WebSocket,
    session: Arc<ReplaySession>,
    pacing: Pacing,
    cancel: CancellationToken,
) {
    tracing::info!("Client connected: {}", session.key());
    let (sender, mut receiver) = socket.split();

    // Stop the loop as soon as the viewer closes its side
    let closed = cancel.clone();
    let watcher = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
        closed.cancel();
    });

    let sink = sender.with(|text: String| futures::future::ready(Ok::<_, axum::Error>(Message::Text(text))));
    let end = dispatch::run(session.clone(), sink, pacing, cancel).await;
    watcher.abort();

    match end {
        DispatchEnd::Disconnected => tracing::info!("Client disconnected: {}", session.key()),
        DispatchEnd::Cancelled => tracing::info!("Stream closed: {}", session.key()),
    }
}
