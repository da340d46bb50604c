//! REST endpoints and the agent event WebSocket.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agents::{Archetype, Registry, Task};
use crate::error::{AgentError, DatabaseError, Error, TemplateError};

/// Default page size for activity and log listings.
const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

/// Build the Axum router with REST and WebSocket routes.
pub fn routes(registry: Arc<Registry>) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/health", get(health))
        .route("/api/agents", get(list_agents).post(create_agent))
        .route("/api/agents/{id}/start", post(start_agent))
        .route("/api/agents/{id}/stop", post(stop_agent))
        .route("/api/agents/{id}/activity", get(agent_activity))
        .route("/api/tasks/{archetype}", post(assign_task))
        .route("/api/logs", get(system_logs))
        .route("/api/projects/{id}/recommendations", get(recommendations))
        .route("/api/projects/{id}/deployments", get(deployments))
        .route("/ws/events", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Agent(AgentError::NotFound { .. } | AgentError::NoKnowledge(_))
        | Error::Database(DatabaseError::NotFound { .. })
        | Error::Template(TemplateError::NotFound { .. }) => StatusCode::NOT_FOUND,
        Error::Agent(AgentError::Unavailable { .. } | AgentError::NotRunning { .. }) => {
            StatusCode::CONFLICT
        }
        Error::Agent(
            AgentError::UnknownArchetype(_)
            | AgentError::UnknownTaskKind { .. }
            | AgentError::InvalidPayload { .. },
        ) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: Error) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        warn!(error = %error, "Request failed");
    }
    (status, Json(serde_json::json!({ "error": error.to_string() }))).into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn parse_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| bad_request("Invalid agent ID"))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "devforge"
    }))
}

// ── Agents ──────────────────────────────────────────────────────────────

async fn list_agents(State(state): State<AppState>) -> Response {
    match state.registry.list_agents().await {
        Ok(agents) => Json(agents).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct CreateAgentRequest {
    name: String,
    archetype: String,
    #[serde(default)]
    config: Option<serde_json::Value>,
}

async fn create_agent(
    State(state): State<AppState>,
    Json(body): Json<CreateAgentRequest>,
) -> Response {
    if body.name.trim().is_empty() {
        return bad_request("Agent name must not be empty");
    }
    let archetype = match body.archetype.parse::<Archetype>() {
        Ok(archetype) => archetype,
        Err(e) => return error_response(e.into()),
    };
    match state
        .registry
        .create_agent(body.name.trim(), archetype, body.config)
        .await
    {
        Ok(agent) => (StatusCode::CREATED, Json(agent)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn start_agent(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.start_agent(id).await {
        Ok(()) => Json(serde_json::json!({ "id": id, "status": "started" })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn stop_agent(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.stop_agent(id).await {
        Ok(()) => Json(serde_json::json!({ "id": id, "status": "stopped" })).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    agent_id: Option<Uuid>,
}

impl ListQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }
}

async fn agent_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let store = state.registry.store();
    match store.get_agent(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(AgentError::NotFound { id }.into()),
        Err(e) => return error_response(e.into()),
    }
    match store.list_activities(Some(id), query.limit()).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(e.into()),
    }
}

async fn system_logs(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    match state
        .registry
        .store()
        .list_system_logs(query.agent_id, query.limit())
        .await
    {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(e.into()),
    }
}

// ── Tasks ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct AssignTaskRequest {
    #[serde(default)]
    id: Option<String>,
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    priority: i32,
}

async fn assign_task(
    State(state): State<AppState>,
    Path(archetype): Path<String>,
    Json(body): Json<AssignTaskRequest>,
) -> Response {
    let archetype = match archetype.parse::<Archetype>() {
        Ok(archetype) => archetype,
        Err(e) => return error_response(e.into()),
    };
    let task_id = body.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let task = Task::new(task_id.clone(), body.kind, body.payload).with_priority(body.priority);

    match state.registry.assign_task(archetype, task).await {
        Ok(agent_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "task_id": task_id, "agent_id": agent_id })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// ── Projects ────────────────────────────────────────────────────────────

async fn recommendations(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.recommendations(&id).await {
        Ok(recs) => Json(serde_json::json!({ "project_id": id, "recommendations": recs }))
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn deployments(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.store().list_deployments(&id).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(e.into()),
    }
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("Event stream client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state.registry))
}

/// Full agent snapshot, sent on connect and after lag.
async fn send_sync(socket: &mut WebSocket, registry: &Registry) -> bool {
    let agents = match registry.list_agents().await {
        Ok(agents) => agents,
        Err(e) => {
            warn!(error = %e, "Failed to load agents for sync");
            Vec::new()
        }
    };
    let sync = serde_json::json!({ "type": "agents_sync", "agents": agents });
    socket
        .send(Message::Text(sync.to_string().into()))
        .await
        .is_ok()
}

async fn handle_socket(mut socket: WebSocket, registry: Arc<Registry>) {
    // Subscribe before the snapshot so no event falls between the two.
    let mut rx = registry.subscribe();

    if !send_sync(&mut socket, &registry).await {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                debug!("Client disconnected during send");
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "Event stream client lagged behind broadcast");
                        if !send_sync(&mut socket, &registry).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Event stream client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_statuses() {
        let id = Uuid::new_v4();
        assert_eq!(
            status_for(&AgentError::NotFound { id }.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(
                &AgentError::Unavailable {
                    archetype: "learning".into()
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&AgentError::UnknownArchetype("x".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AgentError::NoKnowledge("p".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&DatabaseError::Query("boom".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn list_limit_is_capped() {
        let query = ListQuery {
            limit: Some(10_000),
            agent_id: None,
        };
        assert_eq!(query.limit(), MAX_LIMIT);
        let query = ListQuery {
            limit: None,
            agent_id: None,
        };
        assert_eq!(query.limit(), DEFAULT_LIMIT);
    }
}
