use crate::domain::{ListQuery, Product};
use crate::transport::http::handlers::common::{parse_id_param, read_product_form, service_error};
use crate::transport::http::types::{
    AppState, DeleteResponse, HandlerError, ListParams, ProductResponse,
};
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{Path, Query, State};
use axum::Json;

#[utoipa::path(
    get,
    path = "/api/products",
    params(ListParams),
    responses(
        (status = 200, description = "All products", body = Vec<Product>),
        (status = 500, description = "Database error", body = ErrorResponse)
    )
)]
pub async fn list_products_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Product>>, HandlerError> {
    let query = ListQuery::from(params);
    let products = state
        .catalog
        .list_products(&query)
        .await
        .map_err(service_error)?;
    Ok(Json(products))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = i64, Path, description = "Product number")),
    responses(
        (status = 200, description = "The product", body = Product),
        (status = 400, description = "Invalid id", body = ErrorResponse),
        (status = 404, description = "No such product", body = ErrorResponse)
    )
)]
pub async fn get_product_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, HandlerError> {
    let product_id = parse_id_param(&id)?;
    let product = state
        .catalog
        .get_product(product_id)
        .await
        .map_err(service_error)?;
    Ok(Json(product))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = i64, Path, description = "Product number")),
    request_body(content = ProductForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Updated product", body = ProductResponse),
        (status = 400, description = "Invalid id or field", body = ErrorResponse),
        (status = 404, description = "No such product", body = ErrorResponse),
        (status = 500, description = "Pipeline or database failure", body = ErrorResponse)
    )
)]
pub async fn update_product_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    form: Result<Multipart, MultipartRejection>,
) -> Result<Json<ProductResponse>, HandlerError> {
    let product_id = parse_id_param(&id)?;
    let (fields, image) = read_product_form(form).await?;
    let product = state
        .catalog
        .update_product(product_id, fields, image)
        .await
        .map_err(service_error)?;
    Ok(Json(ProductResponse { ok: true, product }))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(("id" = i64, Path, description = "Product number")),
    responses(
        (status = 200, description = "Product deleted", body = DeleteResponse),
        (status = 400, description = "Invalid id", body = ErrorResponse),
        (status = 404, description = "No such product", body = ErrorResponse)
    )
)]
pub async fn delete_product_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, HandlerError> {
    let product_id = parse_id_param(&id)?;
    state
        .catalog
        .delete_product(product_id)
        .await
        .map_err(service_error)?;
    Ok(Json(DeleteResponse {
        ok: true,
        product_id,
    }))
}
