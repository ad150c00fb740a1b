//! HTTP API
//!
//! Thin axum layer over the session and discovery modules. Handlers never
//! hold locks across awaits on the device; everything flows through the
//! session handle.

use crate::config::DiscoveryConfig;
use crate::discovery;
use crate::net;
use crate::session::{AvrSession, ConnectionState, DeviceError, MirroredState};
use crate::settings::SettingsStore;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub session: Option<AvrSession>,
    pub settings: Arc<SettingsStore>,
    pub discovery: DiscoveryConfig,
    pub started_at: Instant,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub enum ApiError {
    NoDevice,
    Device(DeviceError),
}

impl From<DeviceError> for ApiError {
    fn from(e: DeviceError) -> Self {
        ApiError::Device(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NoDevice => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no AVR configured".to_string(),
            ),
            ApiError::Device(e) => {
                let status = match &e {
                    DeviceError::UnknownCommand(_) => StatusCode::BAD_REQUEST,
                    DeviceError::CommandTimeout => StatusCode::GATEWAY_TIMEOUT,
                    DeviceError::SessionClosed => StatusCode::SERVICE_UNAVAILABLE,
                    DeviceError::ConnectionTimeout(_)
                    | DeviceError::ConnectionLost
                    | DeviceError::MalformedReply(_) => StatusCode::BAD_GATEWAY,
                };
                (status, e.to_string())
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(service_status))
        .route("/avr/status", get(avr_status))
        .route("/avr/connect", post(avr_connect))
        .route("/avr/power", get(avr_power))
        .route("/avr/volume", get(avr_volume))
        .route("/avr/mute", get(avr_mute))
        .route("/avr/input", get(avr_input))
        .route("/avr/sound_mode", get(avr_sound_mode))
        .route("/avr/command", post(avr_command))
        .route("/net/devices", get(net_devices))
        .route("/net/reachable/{ip}", get(net_reachable))
        .route("/discovery/avr", get(discover_avrs))
        .route("/discovery/tv", get(discover_tvs))
        .route("/discovery/avr/validate", post(validate_avrs))
        .route("/discovery/tv/validate", post(validate_tvs))
        .with_state(state)
}

fn session(state: &AppState) -> Result<&AvrSession, ApiError> {
    state.session.as_ref().ok_or(ApiError::NoDevice)
}

async fn service_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let connection = match &state.session {
        Some(session) => Some(session.connection_state().await),
        None => None,
    };
    Json(json!({
        "service": "avlink",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "avr_configured": state.session.is_some(),
        "avr_connection": connection,
    }))
}

#[derive(Debug, Serialize)]
struct AvrStatus {
    connection_state: ConnectionState,
    target_ip: String,
    target_port: u16,
    state: MirroredState,
}

async fn avr_status(State(state): State<AppState>) -> Result<Json<AvrStatus>, ApiError> {
    let session = session(&state)?;
    Ok(Json(AvrStatus {
        connection_state: session.connection_state().await,
        target_ip: session.target().ip.clone(),
        target_port: session.target().port,
        state: session.mirrored_state().await,
    }))
}

async fn avr_connect(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let session = session(&state)?;
    session.connect().await?;
    Ok(Json(json!({
        "connection_state": session.connection_state().await,
    })))
}

async fn avr_power(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let power = session(&state)?.get_power_state().await?;
    Ok(Json(json!({ "power": power })))
}

async fn avr_volume(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let volume = session(&state)?.get_volume().await?;
    Ok(Json(json!({ "volume_percent": volume })))
}

async fn avr_mute(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let muted = session(&state)?.get_mute_state().await?;
    Ok(Json(json!({ "muted": muted })))
}

async fn avr_input(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let input = session(&state)?.get_current_input().await?;
    Ok(Json(json!({ "input": input })))
}

async fn avr_sound_mode(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let mode = session(&state)?.get_sound_mode().await?;
    Ok(Json(json!({ "sound_mode": mode })))
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    name: String,
}

async fn avr_command(
    State(state): State<AppState>,
    Json(body): Json<CommandRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = session(&state)?;
    let sent = session.send_command(&body.name).await?;
    Ok(Json(json!({
        "name": body.name,
        "sent": sent,
        "state": session.mirrored_state().await,
    })))
}

async fn net_devices() -> Json<serde_json::Value> {
    let devices = net::list_known_devices().await;
    Json(json!({ "devices": devices }))
}

async fn net_reachable(
    axum::extract::Path(ip): axum::extract::Path<String>,
) -> Json<serde_json::Value> {
    let reachable = net::check_reachable(&ip, std::time::Duration::from_secs(2)).await;
    Json(json!({ "ip": ip, "reachable": reachable }))
}

async fn discover_avrs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let candidates = discovery::scan_for_avr_devices(&state.discovery).await;
    Json(json!({ "candidates": candidates }))
}

async fn discover_tvs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let candidates = discovery::scan_for_tv_devices(&state.discovery).await;
    Json(json!({ "candidates": candidates }))
}

async fn validate_avrs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let candidates = discovery::scan_for_avr_devices(&state.discovery).await;
    let validated = discovery::validate::validate_avr_candidates(&candidates, &state.discovery).await;
    state
        .settings
        .record_discovery("avr", candidates.len(), validated.len())
        .await;
    Json(json!({ "candidates": candidates.len(), "validated": validated }))
}

async fn validate_tvs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let candidates = discovery::scan_for_tv_devices(&state.discovery).await;
    let validated = discovery::validate::validate_tv_candidates(&candidates, &state.discovery).await;
    state
        .settings
        .record_discovery("tv", candidates.len(), validated.len())
        .await;
    Json(json!({ "candidates": candidates.len(), "validated": validated }))
}
