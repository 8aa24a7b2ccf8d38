//! Product store backed by PostgreSQL.

use super::{ProductStore, StoreError, PRODUCT_ID_COUNTER};
use crate::domain::{ListQuery, ListSort, NewProduct, Product, ProductPatch, RepairReport};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

const PRODUCT_COLUMNS: &str =
    "product_id, name, brand, mrp, weight, flavor, gst, image_path, created_at, updated_at";

#[derive(Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    /// Connects and makes sure the tables exist.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::new_with_pool(pool).await
    }

    pub async fn new_with_pool(pool: PgPool) -> Result<Self, StoreError> {
        // `id` is the physical row id and the insertion-order tiebreak for repairs;
        // `product_id` is the public, sequential number.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS products (
                id BIGSERIAL PRIMARY KEY,
                product_id BIGINT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                brand TEXT NOT NULL DEFAULT '',
                mrp DOUBLE PRECISION NOT NULL DEFAULT 0,
                weight TEXT NOT NULL DEFAULT '',
                flavor TEXT NOT NULL DEFAULT '',
                gst DOUBLE PRECISION NOT NULL DEFAULT 0,
                image_path TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                seq BIGINT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the counter row if missing and locks it until `tx` ends.
    async fn lock_counter(tx: &mut Transaction<'_, Postgres>) -> Result<i64, StoreError> {
        sqlx::query("INSERT INTO counters (name, seq) VALUES ($1, -1) ON CONFLICT (name) DO NOTHING")
            .bind(PRODUCT_ID_COUNTER)
            .execute(&mut **tx)
            .await?;
        let seq: i64 = sqlx::query_scalar("SELECT seq FROM counters WHERE name = $1 FOR UPDATE")
            .bind(PRODUCT_ID_COUNTER)
            .fetch_one(&mut **tx)
            .await?;
        Ok(seq)
    }
}

/// Turns violations of the two unique columns into their dedicated errors.
fn map_unique_violation(err: sqlx::Error, image_path: &str, product_id: i64) -> StoreError {
    let constraint = match err.as_database_error() {
        Some(db) if db.is_unique_violation() => db.constraint().map(str::to_string),
        _ => None,
    };
    match constraint.as_deref() {
        Some("products_image_path_key") => StoreError::DuplicateImagePath(image_path.to_string()),
        Some("products_product_id_key") => StoreError::DuplicateProductId(product_id),
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_with_next_id(&self, product: NewProduct) -> Result<Product, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The row lock taken by the increment serializes concurrent allocators until commit.
        Self::lock_counter(&mut tx).await?;
        let seq: i64 =
            sqlx::query_scalar("UPDATE counters SET seq = seq + 1 WHERE name = $1 RETURNING seq")
                .bind(PRODUCT_ID_COUNTER)
                .fetch_one(&mut *tx)
                .await?;

        // Timestamps are read under the counter lock so `created_at` order equals allocation order.
        let sql = format!(
            "INSERT INTO products
                (product_id, name, brand, mrp, weight, flavor, gst, image_path, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, clock_timestamp(), clock_timestamp())
             RETURNING {PRODUCT_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Product>(&sql)
            .bind(seq)
            .bind(&product.name)
            .bind(&product.brand)
            .bind(product.mrp)
            .bind(&product.weight)
            .bind(&product.flavor)
            .bind(product.gst)
            .bind(&product.image_path)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_unique_violation(e, &product.image_path, seq))?;

        tx.commit().await?;
        debug!(product_id = seq, "allocated product id");
        Ok(created)
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Product>, StoreError> {
        let order = match query.sort {
            ListSort::Id => "product_id ASC",
            ListSort::Recent => "created_at DESC, id DESC",
        };
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY {order} LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, Product>(&sql)
            .bind(query.limit.map(i64::from))
            .bind(i64::from(query.offset))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get(&self, product_id: i64) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1");
        let row = sqlx::query_as::<_, Product>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update(
        &self,
        product_id: i64,
        patch: &ProductPatch,
    ) -> Result<Option<Product>, StoreError> {
        let sql = format!(
            "UPDATE products SET
                name = COALESCE($2, name),
                brand = COALESCE($3, brand),
                mrp = COALESCE($4, mrp),
                weight = COALESCE($5, weight),
                flavor = COALESCE($6, flavor),
                gst = COALESCE($7, gst),
                image_path = COALESCE($8, image_path),
                updated_at = now()
             WHERE product_id = $1
             RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Product>(&sql)
            .bind(product_id)
            .bind(patch.name.as_deref())
            .bind(patch.brand.as_deref())
            .bind(patch.mrp)
            .bind(patch.weight.as_deref())
            .bind(patch.flavor.as_deref())
            .bind(patch.gst)
            .bind(patch.image_path.as_deref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                map_unique_violation(e, patch.image_path.as_deref().unwrap_or_default(), product_id)
            })?;
        Ok(row)
    }

    async fn delete(&self, product_id: i64) -> Result<Option<Product>, StoreError> {
        let sql = format!("DELETE FROM products WHERE product_id = $1 RETURNING {PRODUCT_COLUMNS}");
        let row = sqlx::query_as::<_, Product>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn counter_value(&self) -> Result<i64, StoreError> {
        let seq: Option<i64> = sqlx::query_scalar("SELECT seq FROM counters WHERE name = $1")
            .bind(PRODUCT_ID_COUNTER)
            .fetch_optional(&self.pool)
            .await?;
        Ok(seq.unwrap_or(-1))
    }

    async fn sync_counter(&self) -> Result<i64, StoreError> {
        let seq: i64 = sqlx::query_scalar(
            "INSERT INTO counters (name, seq)
             VALUES ($1, COALESCE((SELECT MAX(product_id) FROM products), -1))
             ON CONFLICT (name) DO UPDATE SET seq = EXCLUDED.seq
             RETURNING seq",
        )
        .bind(PRODUCT_ID_COUNTER)
        .fetch_one(&self.pool)
        .await?;
        info!(seq, "product id counter synced with stored maximum");
        Ok(seq)
    }

    async fn repair_ids(&self) -> Result<RepairReport, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_counter(&mut tx).await?;

        let current: Vec<i64> =
            sqlx::query_scalar("SELECT product_id FROM products ORDER BY created_at ASC, id ASC")
                .fetch_all(&mut *tx)
                .await?;
        let changed = current
            .iter()
            .enumerate()
            .filter(|(idx, id)| **id != *idx as i64)
            .count();

        // Move everything out of the target range first so the unique index never
        // sees two rows with the same number mid-update.
        sqlx::query("UPDATE products SET product_id = -product_id - 1")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "WITH ordered AS (
                SELECT id, ROW_NUMBER() OVER (ORDER BY created_at ASC, id ASC) - 1 AS new_id
                FROM products
             )
             UPDATE products p SET product_id = o.new_id FROM ordered o WHERE p.id = o.id",
        )
        .execute(&mut *tx)
        .await?;

        let counter = current.len() as i64 - 1;
        sqlx::query("UPDATE counters SET seq = $2 WHERE name = $1")
            .bind(PRODUCT_ID_COUNTER)
            .bind(counter)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(RepairReport {
            total: current.len(),
            changed,
            counter,
        })
    }
}
