// Query interface shared by the Postgres and in-memory stores.

use crate::model::{Category, Clue, ClueRecord, InvalidMark};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Largest page any read may return.
pub const MAX_PAGE: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Network or store-side failure worth retrying.
    #[error("transient store failure: {0}")]
    Transient(String),
    /// A call exceeded its deadline; retryable like `Transient`.
    #[error("store call timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// A clue references a category the store does not hold.
    #[error("referential integrity violation: {0}")]
    Integrity(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Timeout(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filters for the clue listing. Dates are inclusive bounds.
#[derive(Debug, Clone, Default)]
pub struct ClueFilter {
    pub value: Option<i32>,
    pub category_id: Option<i64>,
    pub game_id: Option<i64>,
    pub min_date: Option<DateTime<Utc>>,
    pub max_date: Option<DateTime<Utc>>,
    /// Clues with `invalid_count >= hide_at` are excluded.
    pub hide_at: i32,
    pub offset: i64,
    pub limit: i64,
}

impl ClueFilter {
    pub fn matches(&self, clue: &Clue) -> bool {
        self.value.map_or(true, |v| clue.value == Some(v))
            && self.category_id.map_or(true, |id| clue.category_id == id)
            && self.game_id.map_or(true, |id| clue.game_id == id)
            && self.min_date.map_or(true, |d| clue.airdate >= d)
            && self.max_date.map_or(true, |d| clue.airdate <= d)
            && is_visible(clue, self.hide_at)
    }
}

/// Null moderation counters count as zero.
pub fn is_visible(clue: &Clue, hide_at: i32) -> bool {
    clue.invalid_count.unwrap_or(0) < hide_at
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub categories: i64,
    pub clues: i64,
}

/// Relational store holding categories and clues.
///
/// Upserts are keyed by id: unknown ids are inserted, known ids are updated
/// only when an imported field changed, leaving `created_at` and the
/// moderation counter alone.
#[async_trait]
pub trait ClueStore: Send + Sync {
    async fn upsert_categories(&self, rows: &[Category]) -> StoreResult<()>;
    async fn upsert_clues(&self, rows: &[Clue]) -> StoreResult<()>;

    async fn category(&self, id: i64) -> StoreResult<Option<Category>>;
    async fn clues_in_category(&self, id: i64, hide_at: i32) -> StoreResult<Vec<Clue>>;
    async fn list_categories(&self, offset: i64, count: i64) -> StoreResult<Vec<Category>>;
    async fn random_categories(&self, count: i64) -> StoreResult<Vec<Category>>;
    async fn random_clues(
        &self,
        count: i64,
        final_only: bool,
        hide_at: i32,
    ) -> StoreResult<Vec<ClueRecord>>;
    async fn list_clues(&self, filter: &ClueFilter) -> StoreResult<Vec<ClueRecord>>;

    /// Increments `invalid_count`; `None` when the clue does not exist.
    async fn mark_invalid(&self, id: i64) -> StoreResult<Option<InvalidMark>>;
    async fn rename_category(&self, id: i64, title: &str) -> StoreResult<bool>;
    async fn category_titles(&self) -> StoreResult<Vec<(i64, String)>>;
    async fn stats(&self) -> StoreResult<StoreStats>;
}
