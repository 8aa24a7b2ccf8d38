//! In-process product store.
//!
//! Mirrors the Postgres semantics (unique product numbers, unique image paths,
//! all-or-nothing allocation) behind a single async mutex. Used for local runs
//! without a database and throughout the test suite.

use super::{ProductStore, StoreError};
use crate::domain::{ListQuery, ListSort, NewProduct, Product, ProductPatch, RepairReport};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

struct Row {
    /// Insertion sequence, the tiebreak when two records share a creation time.
    seq: u64,
    product: Product,
}

struct State {
    counter: i64,
    next_seq: u64,
    rows: Vec<Row>,
}

pub struct MemoryProductStore {
    state: Mutex<State>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                counter: -1,
                next_seq: 0,
                rows: Vec::new(),
            }),
        }
    }

    /// Overwrites a record's product number without touching the counter.
    /// Test support: simulates manual edits that the repair routine is meant to clean up.
    #[doc(hidden)]
    pub async fn force_product_id(&self, from: i64, to: i64) -> bool {
        let mut state = self.state.lock().await;
        match state.rows.iter_mut().find(|r| r.product.product_id == from) {
            Some(row) => {
                row.product.product_id = to;
                true
            }
            None => false,
        }
    }
}

impl Default for MemoryProductStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_with_next_id(&self, product: NewProduct) -> Result<Product, StoreError> {
        let mut state = self.state.lock().await;

        // All checks run before the counter moves.
        if state
            .rows
            .iter()
            .any(|r| r.product.image_path == product.image_path)
        {
            return Err(StoreError::DuplicateImagePath(product.image_path));
        }
        let next = state.counter + 1;
        if state.rows.iter().any(|r| r.product.product_id == next) {
            return Err(StoreError::DuplicateProductId(next));
        }

        let created = product.into_product(next, Utc::now());
        let seq = state.next_seq;
        state.next_seq += 1;
        state.rows.push(Row {
            seq,
            product: created.clone(),
        });
        state.counter = next;
        Ok(created)
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Product>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<&Row> = state.rows.iter().collect();
        match query.sort {
            ListSort::Id => rows.sort_by_key(|r| r.product.product_id),
            ListSort::Recent => rows.sort_by(|a, b| {
                b.product
                    .created_at
                    .cmp(&a.product.created_at)
                    .then(b.seq.cmp(&a.seq))
            }),
        }
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(limit)
            .map(|r| r.product.clone())
            .collect())
    }

    async fn get(&self, product_id: i64) -> Result<Option<Product>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .iter()
            .find(|r| r.product.product_id == product_id)
            .map(|r| r.product.clone()))
    }

    async fn update(
        &self,
        product_id: i64,
        patch: &ProductPatch,
    ) -> Result<Option<Product>, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(path) = &patch.image_path {
            if state
                .rows
                .iter()
                .any(|r| &r.product.image_path == path && r.product.product_id != product_id)
            {
                return Err(StoreError::DuplicateImagePath(path.clone()));
            }
        }
        let Some(row) = state
            .rows
            .iter_mut()
            .find(|r| r.product.product_id == product_id)
        else {
            return Ok(None);
        };
        patch.apply(&mut row.product, Utc::now());
        Ok(Some(row.product.clone()))
    }

    async fn delete(&self, product_id: i64) -> Result<Option<Product>, StoreError> {
        let mut state = self.state.lock().await;
        let pos = state
            .rows
            .iter()
            .position(|r| r.product.product_id == product_id);
        Ok(pos.map(|idx| state.rows.remove(idx).product))
    }

    async fn counter_value(&self) -> Result<i64, StoreError> {
        Ok(self.state.lock().await.counter)
    }

    async fn sync_counter(&self) -> Result<i64, StoreError> {
        let mut state = self.state.lock().await;
        state.counter = state
            .rows
            .iter()
            .map(|r| r.product.product_id)
            .max()
            .unwrap_or(-1);
        Ok(state.counter)
    }

    async fn repair_ids(&self) -> Result<RepairReport, StoreError> {
        let mut state = self.state.lock().await;
        state
            .rows
            .sort_by(|a, b| a.product.created_at.cmp(&b.product.created_at).then(a.seq.cmp(&b.seq)));
        let mut changed = 0;
        for (idx, row) in state.rows.iter_mut().enumerate() {
            if row.product.product_id != idx as i64 {
                row.product.product_id = idx as i64;
                changed += 1;
            }
        }
        state.counter = state.rows.len() as i64 - 1;
        Ok(RepairReport {
            total: state.rows.len(),
            changed,
            counter: state.counter,
        })
    }
}
