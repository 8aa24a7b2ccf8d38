use crate::app::catalog_service::PUBLIC_UPLOAD_PREFIX;
use crate::domain::{ListSort, Product, RepairReport};
use crate::transport::http::handlers::{admin, health, products, upload};
use crate::transport::http::types::{
    AppState, DeleteResponse, ErrorResponse, HealthResponse, PingResponse, ProductForm,
    ProductResponse, RepairRequest, RepairResponse,
};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        health::ping_handler,
        upload::upload_handler,
        products::list_products_handler,
        products::get_product_handler,
        products::update_product_handler,
        products::delete_product_handler,
        admin::repair_ids_handler
    ),
    components(schemas(
        Product,
        ListSort,
        ProductForm,
        ProductResponse,
        DeleteResponse,
        RepairRequest,
        RepairReport,
        RepairResponse,
        HealthResponse,
        PingResponse,
        ErrorResponse
    ))
)]
#[allow(dead_code)]
pub struct ApiDoc;

pub fn create_router(app_state: AppState) -> Router {
    let upload_dir = app_state.catalog.upload_dir().to_path_buf();
    let client_dir = app_state.client_dir.clone();
    let body_limit = app_state.max_upload_bytes;

    let api = Router::new()
        .route("/health", get(health::healthcheck_handler))
        .route("/api/ping", get(health::ping_handler))
        .route("/api/upload", post(upload::upload_handler))
        .route("/api/products", get(products::list_products_handler))
        .route(
            "/api/products/:id",
            get(products::get_product_handler)
                .put(products::update_product_handler)
                .delete(products::delete_product_handler),
        )
        .route("/admin/repair-ids", post(admin::repair_ids_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state);

    // Stored image paths are `uploads/<file>`; the second mount keeps older absolute links working.
    let router = api
        .nest_service(
            &format!("/{}", PUBLIC_UPLOAD_PREFIX),
            ServeDir::new(&upload_dir),
        )
        .nest_service("/server/uploads", ServeDir::new(&upload_dir));

    match client_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}
