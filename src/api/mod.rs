//! HTTP JSON API
//!
//! Mirrors the text protocol for tools that prefer HTTP: output management,
//! remote sensor reports, and a WebSocket carrying the same notifications
//! protocol clients receive.

use crate::error::AccessoryError;
use crate::outputs::{OutputFlags, OutputStatus};
use crate::sensors::RemoteSensorStatus;
use crate::station::Station;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared state for API handlers
pub struct ApiState {
    pub station: Station,
}

/// Request body for creating or redefining an output
#[derive(Debug, Deserialize)]
pub struct DefineOutputRequest {
    pub pin: u8,
    pub flags: u8,
}

/// Request body for setting an output state
#[derive(Debug, Deserialize)]
pub struct SetOutputRequest {
    pub active: bool,
}

/// Request body for a remote sensor report
#[derive(Debug, Deserialize)]
pub struct SensorReportRequest {
    pub value: u16,
}

/// API error response
#[derive(Debug, Serialize)]
struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl From<AccessoryError> for ApiError {
    fn from(e: AccessoryError) -> Self {
        let status = match &e {
            AccessoryError::NotFound { .. } => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/outputs", get(list_outputs))
        .route(
            "/api/outputs/:id",
            get(get_output).put(define_output).delete(delete_output),
        )
        .route("/api/outputs/:id/state", post(set_output_state))
        .route("/api/outputs/:id/toggle", post(toggle_output))
        .route("/api/sensors/remote", get(list_remote_sensors))
        .route(
            "/api/sensors/remote/:id",
            put(report_remote_sensor).delete(delete_remote_sensor),
        )
        .route("/api/config/store", post(store_config))
        .route("/api/ws/events", get(events_ws))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/outputs - List all outputs
async fn list_outputs(State(state): State<Arc<ApiState>>) -> Json<Vec<OutputStatus>> {
    let outputs = state.station.outputs.lock();
    Json(outputs.list().iter().map(|o| o.status()).collect())
}

/// GET /api/outputs/:id
async fn get_output(
    Path(id): Path<u16>,
    State(state): State<Arc<ApiState>>,
) -> ApiResult<OutputStatus> {
    let output = state
        .station
        .outputs
        .lock()
        .get(id)
        .ok_or_else(|| AccessoryError::output_not_found(id))?;
    Ok(Json(output.status()))
}

/// PUT /api/outputs/:id - Create or redefine an output
async fn define_output(
    Path(id): Path<u16>,
    State(state): State<Arc<ApiState>>,
    Json(req): Json<DefineOutputRequest>,
) -> ApiResult<OutputStatus> {
    let mut outputs = state.station.outputs.lock();
    outputs.create_or_update(id, req.pin, OutputFlags::new(req.flags))?;
    let output = outputs
        .get(id)
        .ok_or_else(|| AccessoryError::output_not_found(id))?;
    Ok(Json(output.status()))
}

/// POST /api/outputs/:id/state
async fn set_output_state(
    Path(id): Path<u16>,
    State(state): State<Arc<ApiState>>,
    Json(req): Json<SetOutputRequest>,
) -> ApiResult<OutputStatus> {
    let mut outputs = state.station.outputs.lock();
    outputs.set(id, req.active)?;
    let output = outputs
        .get(id)
        .ok_or_else(|| AccessoryError::output_not_found(id))?;
    Ok(Json(output.status()))
}

/// POST /api/outputs/:id/toggle
async fn toggle_output(
    Path(id): Path<u16>,
    State(state): State<Arc<ApiState>>,
) -> ApiResult<OutputStatus> {
    let mut outputs = state.station.outputs.lock();
    outputs.toggle(id)?;
    let output = outputs
        .get(id)
        .ok_or_else(|| AccessoryError::output_not_found(id))?;
    Ok(Json(output.status()))
}

/// DELETE /api/outputs/:id
async fn delete_output(
    Path(id): Path<u16>,
    State(state): State<Arc<ApiState>>,
) -> ApiResult<OutputStatus> {
    let output = state.station.outputs.lock().remove(id)?;
    Ok(Json(output.status()))
}

/// GET /api/sensors/remote
async fn list_remote_sensors(State(state): State<Arc<ApiState>>) -> Json<serde_json::Value> {
    Json(state.station.remote_sensors.lock().state_as_json())
}

/// PUT /api/sensors/remote/:id - Report a remote sensor value
async fn report_remote_sensor(
    Path(raw_id): Path<u16>,
    State(state): State<Arc<ApiState>>,
    Json(req): Json<SensorReportRequest>,
) -> ApiResult<RemoteSensorStatus> {
    let mut sensors = state.station.remote_sensors.lock();
    sensors.report(raw_id, req.value)?;
    let sensor = sensors
        .get(raw_id)
        .ok_or_else(|| AccessoryError::sensor_not_found(raw_id))?;
    Ok(Json(sensors.status(&sensor)))
}

/// DELETE /api/sensors/remote/:id
async fn delete_remote_sensor(
    Path(raw_id): Path<u16>,
    State(state): State<Arc<ApiState>>,
) -> ApiResult<serde_json::Value> {
    state.station.remote_sensors.lock().remove(raw_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// POST /api/config/store - Persist output definitions
async fn store_config(State(state): State<Arc<ApiState>>) -> ApiResult<serde_json::Value> {
    let count = state.station.store_outputs().await?;
    Ok(Json(serde_json::json!({ "outputs": count })))
}

/// GET /api/ws/events - WebSocket for push notifications
async fn events_ws(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let rx = state.station.broadcaster.subscribe();
    ws.on_upgrade(move |socket| handle_websocket(socket, rx))
}

/// Forward broadcast notifications to a WebSocket client
async fn handle_websocket(mut socket: WebSocket, mut rx: broadcast::Receiver<String>) {
    debug!("WebSocket client connected for events");

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(line) => {
                        if socket.send(Message::Text(line)).await.is_err() {
                            debug!("WebSocket client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged by {} messages", n);
                    }
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client closed connection");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

/// Start the API server, serving until `shutdown` resolves
pub async fn start_server(
    state: Arc<ApiState>,
    addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = build_router(state);

    info!("Starting HTTP API server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
