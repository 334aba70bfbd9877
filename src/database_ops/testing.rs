// Fault injection around MemoryStore for pipeline tests.

use crate::database_ops::memory::MemoryStore;
use crate::database_ops::store::{ClueFilter, ClueStore, StoreError, StoreResult, StoreStats};
use crate::model::{Category, Clue, ClueRecord, InvalidMark};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Categories,
    Clues,
}

#[derive(Default)]
struct Counter {
    calls: AtomicU32,
    pending_failures: AtomicU32,
    largest_batch: AtomicUsize,
}

impl Counter {
    fn hit(&self, rows: usize) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.largest_batch.fetch_max(rows, Ordering::SeqCst);
        let failed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(StoreError::Transient("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

/// Delegates to a [`MemoryStore`], failing upserts on demand.
pub struct FaultyStore {
    inner: MemoryStore,
    categories: Counter,
    clues: Counter,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            categories: Counter::default(),
            clues: Counter::default(),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn counter(&self, op: Op) -> &Counter {
        match op {
            Op::Categories => &self.categories,
            Op::Clues => &self.clues,
        }
    }

    /// The next `n` calls of `op` fail with a transient error.
    pub fn fail_next(&self, op: Op, n: u32) {
        self.counter(op).pending_failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self, op: Op) -> u32 {
        self.counter(op).calls.load(Ordering::SeqCst)
    }

    /// Row count of the biggest upsert seen for `op`.
    pub fn largest_batch(&self, op: Op) -> usize {
        self.counter(op).largest_batch.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClueStore for FaultyStore {
    async fn upsert_categories(&self, rows: &[Category]) -> StoreResult<()> {
        self.categories.hit(rows.len())?;
        self.inner.upsert_categories(rows).await
    }

    async fn upsert_clues(&self, rows: &[Clue]) -> StoreResult<()> {
        self.clues.hit(rows.len())?;
        self.inner.upsert_clues(rows).await
    }

    async fn category(&self, id: i64) -> StoreResult<Option<Category>> {
        self.inner.category(id).await
    }

    async fn clues_in_category(&self, id: i64, hide_at: i32) -> StoreResult<Vec<Clue>> {
        self.inner.clues_in_category(id, hide_at).await
    }

    async fn list_categories(&self, offset: i64, count: i64) -> StoreResult<Vec<Category>> {
        self.inner.list_categories(offset, count).await
    }

    async fn random_categories(&self, count: i64) -> StoreResult<Vec<Category>> {
        self.inner.random_categories(count).await
    }

    async fn random_clues(
        &self,
        count: i64,
        final_only: bool,
        hide_at: i32,
    ) -> StoreResult<Vec<ClueRecord>> {
        self.inner.random_clues(count, final_only, hide_at).await
    }

    async fn list_clues(&self, filter: &ClueFilter) -> StoreResult<Vec<ClueRecord>> {
        self.inner.list_clues(filter).await
    }

    async fn mark_invalid(&self, id: i64) -> StoreResult<Option<InvalidMark>> {
        self.inner.mark_invalid(id).await
    }

    async fn rename_category(&self, id: i64, title: &str) -> StoreResult<bool> {
        self.inner.rename_category(id, title).await
    }

    async fn category_titles(&self) -> StoreResult<Vec<(i64, String)>> {
        self.inner.category_titles().await
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        self.inner.stats().await
    }
}
