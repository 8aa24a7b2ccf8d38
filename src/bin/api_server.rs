// src/bin/api_server.rs

use anyhow::Context;
use product_catalog::infra::config::{PipelineConfig, ServerConfig, StorageBackend};
use product_catalog::infra::logging::init_tracing;
use product_catalog::{storage, transport, CatalogService, ImagePipeline};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("invalid server configuration")?;
    let pipeline_config = PipelineConfig::from_env().context("invalid image pipeline configuration")?;
    info!(
        background_removal = pipeline_config.background_removal,
        upscale = ?pipeline_config.upscale,
        target_size = pipeline_config.compose.target_size,
        "image pipeline configured"
    );

    // --- Store Initialization ---
    info!(backend = backend_name(&config), "connecting product store");
    let store = storage::connect(&config.storage)
        .await
        .context("could not open the product store")?;
    // Counter must never sit below the highest stored id (e.g. after manual inserts).
    let counter = store.sync_counter().await?;
    info!(counter, "product id counter synchronized");

    // --- Service Initialization ---
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("could not create {}", config.upload_dir.display()))?;
    let pipeline = Arc::new(ImagePipeline::from_config(&pipeline_config));
    let catalog = Arc::new(CatalogService::new(store, pipeline, config.upload_dir.clone()));

    let client_dir = if config.client_dir.is_dir() {
        Some(config.client_dir.clone())
    } else {
        warn!(dir = %config.client_dir.display(), "client directory not found; not serving the browser client");
        None
    };

    let app_state = transport::http::AppState {
        catalog,
        client_dir,
        max_upload_bytes: config.max_upload_bytes,
    };

    // --- API Server Initialization ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = transport::http::create_router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("could not bind {}", addr))?;
    info!("API server listening on http://{}", addr);
    info!("Swagger UI available at http://localhost:{}/swagger-ui", config.port);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received (Ctrl+C)");
        }
    }

    Ok(())
}

fn backend_name(config: &ServerConfig) -> &'static str {
    match config.storage {
        StorageBackend::Postgres { .. } => "postgres",
        StorageBackend::Memory => "memory",
    }
}
