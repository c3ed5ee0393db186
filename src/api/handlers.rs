//! HTTP endpoint handlers

use std::{sync::Arc, time::Instant};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use tracing::{error, info, warn};

use crate::{
    input::{Key, KeyRelease},
    state::{AppSettings, AppState, SettingsUpdate},
};
use super::responses::{
    ApiResponse, DevicesResponse, ErrorResponse, HealthResponse, KeyReleaseRequest, StatusResponse,
};

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(message: String) -> ApiError {
    error!("{}", message);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(message)))
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message)))
}

/// Handle POST /enable - Arm on future removals
pub async fn enable_handler(State(state): State<Arc<AppState>>) -> Result<Json<ApiResponse>, ApiError> {
    let change = state.set_enabled(true).map_err(internal_error)?;
    info!("Enable endpoint called - auto-lock enabled");
    Ok(Json(ApiResponse::for_change("Auto-lock enabled".to_string(), change)))
}

/// Handle POST /disable - Stop arming; a running countdown still finishes
pub async fn disable_handler(State(state): State<Arc<AppState>>) -> Result<Json<ApiResponse>, ApiError> {
    let change = state.set_enabled(false).map_err(internal_error)?;
    info!("Disable endpoint called - auto-lock disabled");
    Ok(Json(ApiResponse::for_change("Auto-lock disabled".to_string(), change)))
}

/// Handle POST /toggle
pub async fn toggle_handler(State(state): State<Arc<AppState>>) -> Result<Json<ApiResponse>, ApiError> {
    let change = state.toggle_enabled().map_err(internal_error)?;
    let message = if change.settings.enabled { "Auto-lock enabled" } else { "Auto-lock disabled" };
    Ok(Json(ApiResponse::for_change(message.to_string(), change)))
}

/// Handle GET /settings
pub async fn get_settings_handler(State(state): State<Arc<AppState>>) -> Result<Json<AppSettings>, ApiError> {
    state.get_settings().map(Json).map_err(internal_error)
}

/// Handle PUT /settings - Change device or countdown, restarting the watcher if needed
pub async fn update_settings_handler(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<ApiResponse>, ApiError> {
    let worker_state = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || worker_state.update_settings(update))
        .await
        .map_err(|e| internal_error(format!("Settings update task failed: {}", e)))?;

    match result {
        Ok(change) => {
            info!("Settings updated: watching {}&{}", change.settings.device_vid, change.settings.device_pid);
            let message = if change.save_error.is_some() { "Settings applied" } else { "Settings saved" };
            Ok(Json(ApiResponse::for_change(message.to_string(), change)))
        }
        Err(e) => {
            warn!("Settings update rejected: {}", e);
            Err(bad_request(e))
        }
    }
}

/// Handle POST /reload - Re-read the settings file
pub async fn reload_handler(State(state): State<Arc<AppState>>) -> Result<Json<ApiResponse>, ApiError> {
    let worker_state = Arc::clone(&state);
    let settings = tokio::task::spawn_blocking(move || worker_state.reload_settings())
        .await
        .map_err(|e| internal_error(format!("Settings reload task failed: {}", e)))?
        .map_err(internal_error)?;
    Ok(Json(ApiResponse::for_settings("Settings reloaded".to_string(), settings)))
}

/// Handle GET /devices - List attached USB devices
pub async fn devices_handler(State(state): State<Arc<AppState>>) -> Result<Json<DevicesResponse>, ApiError> {
    let worker_state = Arc::clone(&state);
    let devices = tokio::task::spawn_blocking(move || worker_state.scan_devices())
        .await
        .map_err(|e| internal_error(format!("Device scan task failed: {}", e)))?
        .map_err(internal_error)?;
    Ok(Json(DevicesResponse { devices }))
}

/// Handle POST /key-release - Report a key release from an external listener
pub async fn key_release_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<KeyReleaseRequest>,
) -> StatusCode {
    state.key_released(KeyRelease {
        key: Key::from_name(&request.key),
        at: Instant::now(),
    });
    StatusCode::ACCEPTED
}

/// Handle GET /status - Return current status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    let settings = state.get_settings().map_err(internal_error)?;
    let pattern = state.watched_pattern().map_err(internal_error)?;
    let countdown = state.countdown_status();
    let (last_action, last_action_time) = state.get_last_action();

    Ok(Json(StatusResponse {
        enabled: countdown.enabled,
        device: pattern.to_string(),
        device_name: settings.device_name,
        device_state: state.device_state(),
        countdown_seconds: countdown.countdown_seconds,
        session_active: countdown.is_session_active(),
        phase: countdown.phase,
        remaining_seconds: countdown.remaining(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    }))
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
