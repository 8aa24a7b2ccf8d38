use crate::transport::http::handlers::common::{read_product_form, service_error};
use crate::transport::http::types::{AppState, HandlerError, ProductResponse};
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::Json;
use tracing::info;

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = ProductForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Product created", body = ProductResponse),
        (status = 400, description = "Missing name/image or invalid field", body = ErrorResponse),
        (status = 413, description = "Upload too large"),
        (status = 500, description = "Pipeline or database failure", body = ErrorResponse)
    )
)]
pub async fn upload_handler(
    State(state): State<AppState>,
    form: Result<Multipart, MultipartRejection>,
) -> Result<Json<ProductResponse>, HandlerError> {
    info!("--> POST /api/upload");
    let (fields, image) = read_product_form(form).await?;
    let product = state
        .catalog
        .create_product(fields, image)
        .await
        .map_err(service_error)?;
    Ok(Json(ProductResponse { ok: true, product }))
}
