use crate::transport::http::handlers::common::service_error;
use crate::transport::http::types::{
    error_response, json_422, AppState, HandlerError, RepairRequest, RepairResponse,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

/// Renumbers every product densely from 0 (oldest first) and resets the counter.
#[utoipa::path(
    post,
    path = "/admin/repair-ids",
    request_body = RepairRequest,
    responses(
        (status = 200, description = "Ids repaired", body = RepairResponse),
        (status = 400, description = "confirm was not set", body = ErrorResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ErrorResponse),
        (status = 500, description = "Database error", body = ErrorResponse)
    )
)]
pub async fn repair_ids_handler(
    State(state): State<AppState>,
    request: Result<Json<RepairRequest>, JsonRejection>,
) -> Result<Json<RepairResponse>, HandlerError> {
    let Json(request) = request.map_err(|e| json_422(e, "{\"confirm\": true}"))?;
    if !request.confirm {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "confirm must be true to repair product ids",
        ));
    }
    let report = state.catalog.repair_ids().await.map_err(service_error)?;
    Ok(Json(RepairResponse { ok: true, report }))
}
