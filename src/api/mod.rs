pub mod dto;
pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    presence::PresenceService, reconcile::ReconciliationEngine, registry::PinHasher,
    store::DeviceStore,
};
use handlers::ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub store: Arc<dyn DeviceStore>,
    pub presence: PresenceService,
    pub pins: PinHasher,
    /// Bearer token for operator endpoints.
    pub admin_token: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/api/sensor/update", post(handlers::sensor_update))
        .route("/api/auth/device", post(handlers::device_auth))
        .route(
            "/api/devices/{device_id}/status",
            get(handlers::device_status),
        )
        .route("/api/devices/{device_id}/ota", post(handlers::request_ota))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
