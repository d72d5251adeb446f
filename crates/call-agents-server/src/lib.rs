//! HTTP surface for agent call session control.
//!
//! Routes mirror the meeting API:
//! - `POST /meetings/{meeting_id}/agent/connect`
//! - `POST /meetings/{meeting_id}/agent/disconnect`
//! - `GET  /meetings/{meeting_id}/agent/status`
//! - `GET  /health`

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use call_agents_core::{MeetingId, MeetingStore, RealtimeProvider};
use call_agents_session::{
    AgentSessionManager,
    manager::{ConnectError, ConnectionState},
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers.
pub struct AppState<S, P>
where
    S: MeetingStore,
    P: RealtimeProvider,
{
    /// Session manager.
    pub manager: Arc<AgentSessionManager<S, P>>,
}

impl<S, P> Clone for AppState<S, P>
where
    S: MeetingStore,
    P: RealtimeProvider,
{
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

/// Build the application router.
#[must_use]
pub fn create_router<S, P>(state: AppState<S, P>) -> Router
where
    S: MeetingStore + 'static,
    P: RealtimeProvider + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route(
            "/meetings/{meeting_id}/agent/connect",
            post(connect_agent::<S, P>),
        )
        .route(
            "/meetings/{meeting_id}/agent/disconnect",
            post(disconnect_agent::<S, P>),
        )
        .route(
            "/meetings/{meeting_id}/agent/status",
            get(agent_status::<S, P>),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    already_connected: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DisconnectResponse {
    success: bool,
    already_idle: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    connected: bool,
    status: ConnectionState,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            message,
        }),
    )
        .into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn connect_agent<S, P>(
    State(state): State<AppState<S, P>>,
    Path(meeting_id): Path<MeetingId>,
) -> Response
where
    S: MeetingStore + 'static,
    P: RealtimeProvider + 'static,
{
    match state.manager.connect(&meeting_id).await {
        Ok(outcome) if outcome.already_connected => Json(ConnectResponse {
            success: true,
            agent_id: None,
            already_connected: Some(true),
        })
        .into_response(),
        Ok(outcome) => Json(ConnectResponse {
            success: true,
            agent_id: outcome.agent_id,
            already_connected: None,
        })
        .into_response(),
        Err(e) => {
            let status = match &e {
                ConnectError::MeetingNotFound(_) | ConnectError::AgentNotConfigured(_) => {
                    StatusCode::NOT_FOUND
                }
                ConnectError::Cancelled(_) => StatusCode::CONFLICT,
                ConnectError::Store(_) | ConnectError::Provider(_) => {
                    tracing::error!(meeting_id = %meeting_id, error = %e, "Agent connect failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            error_response(status, e.to_string())
        }
    }
}

async fn disconnect_agent<S, P>(
    State(state): State<AppState<S, P>>,
    Path(meeting_id): Path<MeetingId>,
) -> Response
where
    S: MeetingStore + 'static,
    P: RealtimeProvider + 'static,
{
    match state.manager.disconnect(&meeting_id).await {
        Ok(outcome) => Json(DisconnectResponse {
            success: true,
            already_idle: outcome.already_idle,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(meeting_id = %meeting_id, error = %e, "Agent disconnect failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn agent_status<S, P>(
    State(state): State<AppState<S, P>>,
    Path(meeting_id): Path<MeetingId>,
) -> Json<StatusResponse>
where
    S: MeetingStore + 'static,
    P: RealtimeProvider + 'static,
{
    let status = state.manager.status(&meeting_id);
    Json(StatusResponse {
        connected: status.connected,
        status: status.state,
    })
}
