//! Product persistence and sequential identifier allocation.
//!
//! Every backend keeps two things: the product records and a singleton counter
//! holding the last allocated product number (`-1` when nothing was allocated yet).

pub mod memory;
pub mod postgres;

pub use memory::MemoryProductStore;
pub use postgres::PgProductStore;

use crate::domain::{ListQuery, NewProduct, Product, ProductPatch, RepairReport};
use crate::infra::config::StorageBackend;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Name of the counter record used for product numbers.
pub const PRODUCT_ID_COUNTER: &str = "product_id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("image path '{0}' is already used by another product")]
    DuplicateImagePath(String),

    #[error("product id {0} is already taken; run the id repair")]
    DuplicateProductId(i64),
}

/// Contract shared by all product stores.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Reserves the next product number and inserts the record carrying it, as one unit.
    /// On error nothing is persisted and the counter is unchanged.
    async fn insert_with_next_id(&self, product: NewProduct) -> Result<Product, StoreError>;

    async fn list(&self, query: &ListQuery) -> Result<Vec<Product>, StoreError>;

    async fn get(&self, product_id: i64) -> Result<Option<Product>, StoreError>;

    /// Applies a partial update. Returns `None` when the product does not exist.
    async fn update(
        &self,
        product_id: i64,
        patch: &ProductPatch,
    ) -> Result<Option<Product>, StoreError>;

    /// Removes a record and returns it, or `None` when it did not exist.
    async fn delete(&self, product_id: i64) -> Result<Option<Product>, StoreError>;

    /// Last allocated product number (-1 when none).
    async fn counter_value(&self) -> Result<i64, StoreError>;

    /// Resets the counter to the highest stored product number (-1 when empty).
    async fn sync_counter(&self) -> Result<i64, StoreError>;

    /// Renumbers every record densely from 0 (oldest first) and resets the counter.
    async fn repair_ids(&self) -> Result<RepairReport, StoreError>;
}

/// Opens the configured backend.
pub async fn connect(backend: &StorageBackend) -> Result<Arc<dyn ProductStore>, StoreError> {
    match backend {
        StorageBackend::Postgres { database_url } => {
            Ok(Arc::new(PgProductStore::connect(database_url).await?))
        }
        StorageBackend::Memory => Ok(Arc::new(MemoryProductStore::new())),
    }
}
