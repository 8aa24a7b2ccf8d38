pub mod app;
pub mod domain;
pub mod infra;
pub mod pipeline;
pub mod storage;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::catalog_service::{CatalogService, ServiceError};
pub use domain::{Product, ProductFields, RepairReport};
pub use pipeline::ImagePipeline;
pub use storage::{MemoryProductStore, PgProductStore, ProductStore, StoreError};
