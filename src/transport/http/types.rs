use crate::app::catalog_service::CatalogService;
use crate::domain::{ListQuery, ListSort, Product, RepairReport};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    /// Browser client served at `/` when set.
    pub client_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

/// Every failure is reported as a free-text message.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

/// What handlers return on failure.
pub type HandlerError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            ok: false,
            error: message.into(),
        }),
    )
}

pub fn json_422(err: JsonRejection, expected: &str) -> HandlerError {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        format!("Invalid JSON body: {} (expected: {})", err, expected),
    )
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ProductResponse {
    pub ok: bool,
    pub product: Product,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct DeleteResponse {
    pub ok: bool,
    pub product_id: i64,
}

#[derive(Deserialize, Serialize, Debug, ToSchema)]
pub struct RepairRequest {
    /// Safety switch to prevent accidental renumbering.
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct RepairResponse {
    pub ok: bool,
    pub report: RepairReport,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct PingResponse {
    pub ok: bool,
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// `recent` (newest first, default) or `id` (ascending product number).
    #[param(inline)]
    pub sort: Option<ListSort>,
    /// Maximum number of products to return.
    pub limit: Option<u32>,
    /// Number of products to skip.
    pub offset: Option<u32>,
}

impl From<ListParams> for ListQuery {
    fn from(p: ListParams) -> Self {
        ListQuery {
            sort: p.sort.unwrap_or_default(),
            limit: p.limit,
            offset: p.offset.unwrap_or(0),
        }
    }
}

/// Multipart form accepted by upload (all text fields optional on update).
#[derive(ToSchema)]
#[allow(unused)] // Schema only
pub struct ProductForm {
    name: String,
    brand: Option<String>,
    mrp: Option<String>,
    weight: Option<String>,
    flavor: Option<String>,
    gst: Option<String>,
    #[schema(value_type = String, format = Binary)]
    image: Vec<u8>,
}
