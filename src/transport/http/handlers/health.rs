use crate::transport::http::types::{AppState, HealthResponse, PingResponse};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy (store reachable)", body = HealthResponse),
        (status = 503, description = "Service is unhealthy (store unreachable)", body = HealthResponse)
    )
)]
pub async fn healthcheck_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.catalog.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                ok: true,
                status: "ok".to_string(),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                ok: false,
                status: "unhealthy".to_string(),
                error: Some(format!("Store ping failed: {}", e)),
            }),
        ),
    }
}

#[utoipa::path(
    get,
    path = "/api/ping",
    responses((status = 200, description = "Always ok", body = PingResponse))
)]
pub async fn ping_handler() -> Json<PingResponse> {
    Json(PingResponse { ok: true })
}
