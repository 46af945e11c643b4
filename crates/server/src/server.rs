//! HTTP and WebSocket server
//!
//! Route handlers validate input, call into the manager / collector / hub,
//! and shape JSON responses. Errors from the domain taxonomy map onto HTTP
//! status codes through [`ApiError`].

use crate::apps::{InstallRequest, InstallationManager};
use crate::auth::{require_auth, AuthMode};
use crate::runtime::{ContainerRuntime, RuntimeKind};
use crate::subscriptions::SubscriptionRegistry;
use crate::telemetry::{TelemetryCollector, TelemetryHub};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use hostdeck_common::{AppDefinition, AppRegistry, Error};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared server state
pub struct AppState {
    pub registry: Arc<AppRegistry>,
    pub manager: InstallationManager,
    pub collector: Arc<TelemetryCollector>,
    pub hub: Arc<TelemetryHub>,
    pub subs: Arc<SubscriptionRegistry>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub runtime_kind: Option<RuntimeKind>,
    pub auth: AuthMode,
}

/// Domain error as an HTTP response
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::AlreadyInstalled { .. } | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            Error::RuntimeTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

/// Build the panel router.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        // App store
        .route("/api/appstore/list", get(appstore_list))
        .route("/api/appstore/detail/:id", get(appstore_detail))
        .route("/api/appstore/categories", get(appstore_categories))
        .route("/api/appstore/installed", get(appstore_installed))
        .route("/api/appstore/install", post(appstore_install))
        .route("/api/appstore/uninstall/:id", post(appstore_uninstall))
        .route("/api/appstore/:id/start", post(appstore_start))
        .route("/api/appstore/:id/stop", post(appstore_stop))
        // Host telemetry
        .route("/api/system/metrics", get(system_metrics))
        .route("/api/system/metrics/history", get(system_metrics_history))
        .route("/api/system/info", get(system_info))
        .route("/api/system/processes", get(system_processes))
        // Container runtime
        .route("/api/docker/status", get(docker_status))
        .route("/api/docker/containers", get(docker_containers))
        .route("/api/docker/containers/:id/state", get(docker_container_state))
        .route("/api/docker/containers/:id/start", post(docker_container_start))
        .route("/api/docker/containers/:id/stop", post(docker_container_stop))
        .route("/api/docker/containers/:id/remove", post(docker_container_remove))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_auth,
        ));

    Router::new()
        .route("/api/health", get(health))
        .route("/ws", get(ws_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve the panel until the task is aborted or the listener fails.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HostDeck API listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Health
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": hostdeck_common::VERSION,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

// ============================================================================
// App store handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListQuery {
    category: Option<String>,
}

async fn appstore_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let apps: Vec<AppDefinition> = match &query.category {
        Some(category) => state
            .registry
            .list_by_category(category)
            .into_iter()
            .cloned()
            .collect(),
        None => state.registry.list().to_vec(),
    };

    Json(json!({
        "apps": apps,
        "categories": state.registry.categories(),
        "total": state.registry.len(),
    }))
}

async fn appstore_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.registry.get(&id)?;
    Ok(Json(json!({ "app": app })))
}

async fn appstore_categories(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "categories": state.registry.categories() }))
}

async fn appstore_installed(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let apps = state.manager.list()?;
    Ok(Json(json!({ "apps": apps })))
}

async fn appstore_install(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InstallRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.manager.install(req)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "App installation started",
            "app": record,
        })),
    ))
}

async fn appstore_uninstall(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.manager.uninstall(&id).await?;
    Ok(Json(json!({ "message": "App uninstalled" })))
}

async fn appstore_start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.manager.start(&id).await?;
    Ok(Json(json!({ "message": "App started", "app": record })))
}

async fn appstore_stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.manager.stop(&id).await?;
    Ok(Json(json!({ "message": "App stopped", "app": record })))
}

// ============================================================================
// Telemetry handlers
// ============================================================================

async fn system_metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.hub.latest() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "no telemetry collected yet"})),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    hours: Option<u64>,
}

async fn system_metrics_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let hours = query.hours.unwrap_or(24);
    if hours == 0 || hours > 24 * 30 {
        return Err(Error::Validation("hours must be between 1 and 720".into()).into());
    }
    Ok(Json(json!({ "metrics": state.hub.history(hours) })))
}

async fn system_info(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let collector = state.collector.clone();
    let snapshot = tokio::task::spawn_blocking(move || collector.collect())
        .await
        .map_err(|e| Error::Collection(e.to_string()))??;

    Ok(Json(json!({
        "cpu": {
            "brand": snapshot.cpu.brand,
            "cores": snapshot.cpu.cores,
            "frequencyMhz": snapshot.cpu.frequency_mhz,
        },
        "memory": {
            "total": snapshot.memory.total,
            "available": snapshot.memory.available,
            "swapTotal": snapshot.memory.swap_total,
        },
        "disk": snapshot.disk,
        "network": snapshot
            .network
            .interfaces
            .iter()
            .map(|i| i.name.clone())
            .collect::<Vec<_>>(),
        "host": snapshot.host,
    })))
}

async fn system_processes(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let collector = state.collector.clone();
    let processes = tokio::task::spawn_blocking(move || collector.top_processes(50))
        .await
        .map_err(|e| Error::Collection(e.to_string()))?;
    Ok(Json(processes))
}

// ============================================================================
// Container runtime handlers
// ============================================================================

async fn docker_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(kind) = state.runtime_kind else {
        return Json(json!({ "available": false }));
    };

    match state.runtime.info().await {
        Ok(info) => Json(json!({
            "available": true,
            "runtime": kind,
            "info": info,
        })),
        Err(e) => Json(json!({
            "available": false,
            "runtime": kind,
            "error": e.to_string(),
        })),
    }
}

async fn docker_containers(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let containers = state.runtime.list_containers().await?;
    Ok(Json(json!({ "containers": containers })))
}

async fn docker_container_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let container_state = state.runtime.inspect(&id).await?;
    Ok(Json(json!({ "id": id, "state": container_state })))
}

async fn docker_container_start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.runtime.start(&id).await?;
    Ok(Json(json!({ "message": "Container started" })))
}

async fn docker_container_stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.runtime.stop(&id).await?;
    Ok(Json(json!({ "message": "Container stopped" })))
}

async fn docker_container_remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.runtime.remove(&id).await?;
    Ok(Json(json!({ "message": "Container removed" })))
}

// ============================================================================
// WebSocket
// ============================================================================

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// Inbound client frame: subscribe / unsubscribe / ping
#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: Option<String>,
}

async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.auth.permits(&headers, query.token.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized"})),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: Arc<AppState>, socket: WebSocket) {
    let client_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.subs.register(&client_id, tx);
    debug!("Client connected: {}", client_id);

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => handle_client_frame(&state, &client_id, frame),
                Err(e) => debug!("Ignoring malformed frame from {}: {}", client_id, e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.subs.remove_client(&client_id);
    writer.abort();
    debug!("Client disconnected: {}", client_id);
}

fn handle_client_frame(state: &AppState, client_id: &str, frame: ClientFrame) {
    match frame.kind.as_str() {
        "subscribe" => {
            if let Some(channel) = frame.channel {
                state.subs.subscribe(client_id, &channel);
                debug!("Client {} subscribed to {}", client_id, channel);
            }
        }
        "unsubscribe" => {
            if let Some(channel) = frame.channel {
                state.subs.unsubscribe(client_id, &channel);
            }
        }
        "ping" => {
            let _ = state
                .subs
                .send_to(client_id, r#"{"type":"pong"}"#.to_string());
        }
        other => debug!("Ignoring unknown frame type from {}: {}", client_id, other),
    }
}
