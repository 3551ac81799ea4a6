use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use tracing::info;
use utoipa::OpenApi;

use super::{
    dto::{
        DeviceAuthRequest, DeviceAuthResponse, DeviceStatusDto, OtaResponse, Pin, ReadingDto,
        ReportRequest, ReportResponse,
    },
    errors::AppError,
    AppState,
};
use crate::{
    control::ota,
    db::models::{LightMode, MistMode},
    error::ValidationError,
    registry::{self, credential, PinExchange},
};

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    match credential::bearer_token(authorization(headers)) {
        Some(token) if token == state.admin_token.as_ref() => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

// ---------------------------------------------------------------------------
// Device endpoints
// ---------------------------------------------------------------------------

/// Accept one telemetry report and answer with actuator commands.
#[utoipa::path(
    post,
    path = "/api/sensor/update",
    request_body = ReportRequest,
    responses(
        (status = 200, description = "Report accepted", body = ReportResponse),
        (status = 400, description = "Malformed or incomplete report"),
        (status = 401, description = "Missing or unknown device credential"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "devices"
)]
pub async fn sensor_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ReportResponse>, AppError> {
    let outcome = state
        .engine
        .handle_report(authorization(&headers), &body)
        .await?;
    Ok(Json(outcome.into()))
}

/// Exchange a provisioned device's PIN for its report credential.
#[utoipa::path(
    post,
    path = "/api/auth/device",
    request_body = DeviceAuthRequest,
    responses(
        (status = 200, description = "Credential issued", body = DeviceAuthResponse),
        (status = 400, description = "Malformed request"),
        (status = 403, description = "Device not allowed or wrong PIN"),
    ),
    tag = "devices"
)]
pub async fn device_auth(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DeviceAuthResponse>, AppError> {
    let req: DeviceAuthRequest =
        serde_json::from_slice(&body).map_err(|_| AppError::Validation(ValidationError::MalformedBody))?;
    let device_id = req.id.trim();
    if device_id.is_empty() {
        return Err(AppError::Validation(ValidationError::MissingField("id")));
    }

    let pin = req.pin.into_string();
    match registry::exchange_pin(state.store.as_ref(), &state.pins, device_id, &pin).await? {
        PinExchange::Granted { token } => Ok(Json(DeviceAuthResponse { token })),
        PinExchange::Denied => Err(AppError::Forbidden),
    }
}

// ---------------------------------------------------------------------------
// Operator endpoints
// ---------------------------------------------------------------------------

/// Current state of one device, with a stale `online` flag corrected on read.
#[utoipa::path(
    get,
    path = "/api/devices/{device_id}/status",
    params(
        ("device_id" = String, Path, description = "Device identifier"),
    ),
    responses(
        (status = 200, description = "Device status", body = DeviceStatusDto),
        (status = 401, description = "Missing or wrong operator token"),
        (status = 404, description = "Unknown device"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "operators"
)]
pub async fn device_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceStatusDto>, AppError> {
    require_admin(&state, &headers)?;

    let device = state
        .store
        .find_device(&device_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("device {device_id}")))?;

    let online = state.presence.is_online(&device);
    if device.online && !online {
        state.presence.sweep(Some(&device_id)).await?;
    }

    let latest = state.store.latest_reading(&device_id).await?;
    Ok(Json(DeviceStatusDto::new(device, online, latest)))
}

/// Queue a firmware update; the device learns about it on its next report.
#[utoipa::path(
    post,
    path = "/api/devices/{device_id}/ota",
    params(
        ("device_id" = String, Path, description = "Device identifier"),
    ),
    responses(
        (status = 200, description = "Update queued", body = OtaResponse),
        (status = 401, description = "Missing or wrong operator token"),
        (status = 404, description = "Unknown device"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "operators"
)]
pub async fn request_ota(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(device_id): Path<String>,
) -> Result<Json<OtaResponse>, AppError> {
    require_admin(&state, &headers)?;

    if !ota::request(state.store.as_ref(), &device_id).await? {
        return Err(AppError::NotFound(format!("device {device_id}")));
    }
    info!(device_id = %device_id, "OTA queued via API");

    Ok(Json(OtaResponse {
        device_id,
        ota_requested: true,
    }))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(sensor_update, device_auth, device_status, request_ota, health),
    components(schemas(
        ReportRequest,
        ReportResponse,
        DeviceAuthRequest,
        DeviceAuthResponse,
        Pin,
        DeviceStatusDto,
        ReadingDto,
        OtaResponse,
        LightMode,
        MistMode,
    )),
    tags(
        (name = "devices",   description = "Endpoints called by terrarium controllers"),
        (name = "operators", description = "Operator endpoints, admin bearer token"),
        (name = "system",    description = "System endpoints"),
    ),
    info(
        title = "Terrarium Control API",
        version = "0.1.0",
        description = "Telemetry intake and actuator reconciliation for terrarium controllers"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
