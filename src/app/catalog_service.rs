//! The catalog service.
//!
//! Sits between the HTTP handlers and the store. It is responsible for:
//! 1.  Validating submitted product forms before anything touches disk or the counter.
//! 2.  Running the image pipeline and placing the result under the upload directory.
//! 3.  Allocating product numbers through the store and cleaning up image files
//!     whose records never made it in (or no longer exist).

use crate::domain::{
    safe_file_stem, ListQuery, Product, ProductFields, ProductPatch, RepairReport, ValidationError,
};
use crate::pipeline::{ImagePipeline, PipelineError};
use crate::storage::{ProductStore, StoreError};
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// URL prefix under which processed images are served; stored paths start with it.
pub const PUBLIC_UPLOAD_PREFIX: &str = "uploads";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("product {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
}

/// An uploaded picture as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub data: Vec<u8>,
}

pub struct CatalogService {
    store: Arc<dyn ProductStore>,
    pipeline: Arc<ImagePipeline>,
    upload_dir: PathBuf,
    /// Raw uploads and pipeline intermediates. Never served.
    scratch_dir: PathBuf,
}

impl CatalogService {
    pub fn new(
        store: Arc<dyn ProductStore>,
        pipeline: Arc<ImagePipeline>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        let upload_dir = upload_dir.into();
        Self {
            store,
            pipeline,
            scratch_dir: default_scratch_dir(&upload_dir),
            upload_dir,
        }
    }

    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn ProductStore> {
        &self.store
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Validates, processes the image, then allocates the next product number and inserts.
    pub async fn create_product(
        &self,
        fields: ProductFields,
        image: Option<ImageUpload>,
    ) -> Result<Product, ServiceError> {
        let (Some(name), Some(image)) = (fields.name().map(str::to_string), image) else {
            return Err(ValidationError::NameAndImageRequired.into());
        };
        // Numeric checks run before the pipeline; the real path is filled in below.
        fields.clone().into_new_product(String::new())?;

        let image_path = self.process_upload(&name, image).await?;
        let new_product = fields.into_new_product(image_path.clone())?;

        match self.store.insert_with_next_id(new_product).await {
            Ok(product) => {
                info!(product_id = product.product_id, name = %product.name, "product created");
                Ok(product)
            }
            Err(e) => {
                self.remove_image_best_effort(&image_path).await;
                Err(e.into())
            }
        }
    }

    pub async fn list_products(&self, query: &ListQuery) -> Result<Vec<Product>, ServiceError> {
        Ok(self.store.list(query).await?)
    }

    pub async fn get_product(&self, product_id: i64) -> Result<Product, ServiceError> {
        self.store
            .get(product_id)
            .await?
            .ok_or(ServiceError::NotFound(product_id))
    }

    /// Merges the submitted fields and, if given, replaces the image.
    pub async fn update_product(
        &self,
        product_id: i64,
        fields: ProductFields,
        image: Option<ImageUpload>,
    ) -> Result<Product, ServiceError> {
        let mut patch: ProductPatch = fields.into_patch()?;
        let existing = self.get_product(product_id).await?;
        if patch.is_empty() && image.is_none() {
            return Ok(existing);
        }

        if let Some(image) = image {
            let name = patch.name.clone().unwrap_or_else(|| existing.name.clone());
            patch.image_path = Some(self.process_upload(&name, image).await?);
        }

        let updated = match self.store.update(product_id, &patch).await {
            Ok(Some(product)) => product,
            result => {
                if let Some(new_path) = &patch.image_path {
                    self.remove_image_best_effort(new_path).await;
                }
                return match result {
                    Err(e) => Err(e.into()),
                    _ => Err(ServiceError::NotFound(product_id)),
                };
            }
        };

        if patch.image_path.is_some() && existing.image_path != updated.image_path {
            self.remove_image_best_effort(&existing.image_path).await;
        }
        info!(product_id, "product updated");
        Ok(updated)
    }

    /// Removes the record, then its image (best effort).
    pub async fn delete_product(&self, product_id: i64) -> Result<Product, ServiceError> {
        let removed = self
            .store
            .delete(product_id)
            .await?
            .ok_or(ServiceError::NotFound(product_id))?;
        self.remove_image_best_effort(&removed.image_path).await;
        info!(product_id, "product deleted");
        Ok(removed)
    }

    pub async fn repair_ids(&self) -> Result<RepairReport, ServiceError> {
        let report = self.store.repair_ids().await?;
        info!(
            total = report.total,
            changed = report.changed,
            counter = report.counter,
            "product ids repaired"
        );
        Ok(report)
    }

    pub async fn sync_counter(&self) -> Result<i64, ServiceError> {
        Ok(self.store.sync_counter().await?)
    }

    /// Maps a stored public path (`uploads/<file>`) to its location on disk.
    /// Anything that would escape the upload directory maps to `None`.
    pub fn disk_path(&self, image_path: &str) -> Option<PathBuf> {
        let rel = Path::new(image_path.trim_start_matches('/'))
            .strip_prefix(PUBLIC_UPLOAD_PREFIX)
            .ok()?;
        if rel.as_os_str().is_empty()
            || !rel.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.upload_dir.join(rel))
    }

    /// Stores the raw upload in a scratch directory, runs the pipeline, returns the public path.
    async fn process_upload(&self, name: &str, image: ImageUpload) -> Result<String, ServiceError> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(".upload-")
            .tempdir_in(&self.scratch_dir)?;
        let raw = scratch.path().join(raw_file_name(image.file_name.as_deref()));
        tokio::fs::write(&raw, &image.data).await?;

        let file_name = format!(
            "{}-{}-{}.jpg",
            safe_file_stem(name),
            Utc::now().timestamp_millis(),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let output = self.upload_dir.join(&file_name);
        self.pipeline.process(&raw, &output).await?;

        // `scratch` (and the raw upload in it) goes away here.
        Ok(format!("{PUBLIC_UPLOAD_PREFIX}/{file_name}"))
    }

    async fn remove_image_best_effort(&self, image_path: &str) {
        let Some(path) = self.disk_path(image_path) else {
            warn!(image_path, "not removing image outside the upload directory");
            return;
        };
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "could not remove image file");
            }
        }
    }
}

/// `<parent>/.<name>-scratch`, a sibling of the upload directory so that the final
/// rename stays on one filesystem.
fn default_scratch_dir(upload_dir: &Path) -> PathBuf {
    let name = upload_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PUBLIC_UPLOAD_PREFIX.to_string());
    upload_dir.with_file_name(format!(".{name}-scratch"))
}

/// Keeps the client's extension so format sniffing tools see a familiar name.
fn raw_file_name(client_name: Option<&str>) -> String {
    let ext = client_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase());
    match ext {
        Some(ext) => format!("original.{ext}"),
        None => "original".to_string(),
    }
}
