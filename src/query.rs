//! Read-side operations behind the HTTP API.
//!
//! Validates request parameters (out-of-range values are rejected, never
//! clamped), applies the moderation threshold and shapes clues for output.
use crate::api::error::ApiError;
use crate::database_ops::store::{ClueFilter, ClueStore, StoreStats, MAX_PAGE};
use crate::model::{Category, CategoryWithClues, Clue, ClueRecord, InvalidMark};
use crate::normalization::fields::parse_date_param;
use serde::Deserialize;
use std::sync::Arc;

/// Clues flagged this many times are hidden from reads.
pub const DEFAULT_HIDE_THRESHOLD: i32 = 5;

/// Filters accepted by the clue listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClueQuery {
    pub value: Option<i32>,
    pub category: Option<i64>,
    pub game_id: Option<i64>,
    pub min_date: Option<String>,
    pub max_date: Option<String>,
    pub offset: Option<i64>,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn ClueStore>,
    hide_at: i32,
}

impl QueryService {
    pub fn new(store: Arc<dyn ClueStore>, hide_at: i32) -> Self {
        Self {
            store,
            hide_at: hide_at.max(1),
        }
    }

    pub async fn stats(&self) -> Result<StoreStats, ApiError> {
        Ok(self.store.stats().await?)
    }

    pub async fn random_clues(&self, count: Option<i64>) -> Result<Vec<ClueRecord>, ApiError> {
        let count = count_param(count)?;
        let clues = self.store.random_clues(count, false, self.hide_at).await?;
        Ok(clues.into_iter().map(present_record).collect())
    }

    /// Random final-round clues (those without a point value).
    pub async fn final_clues(&self, count: Option<i64>) -> Result<Vec<ClueRecord>, ApiError> {
        let count = count_param(count)?;
        let clues = self.store.random_clues(count, true, self.hide_at).await?;
        Ok(clues.into_iter().map(present_record).collect())
    }

    pub async fn clues(&self, query: &ClueQuery) -> Result<Vec<ClueRecord>, ApiError> {
        let filter = ClueFilter {
            value: query.value,
            category_id: query.category,
            game_id: query.game_id,
            min_date: date_param("min_date", query.min_date.as_deref())?,
            max_date: date_param("max_date", query.max_date.as_deref())?,
            hide_at: self.hide_at,
            offset: offset_param(query.offset)?,
            limit: MAX_PAGE,
        };
        let clues = self.store.list_clues(&filter).await?;
        Ok(clues.into_iter().map(present_record).collect())
    }

    pub async fn categories(
        &self,
        count: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Category>, ApiError> {
        let count = count_param(count)?;
        let offset = offset_param(offset)?;
        Ok(self.store.list_categories(offset, count).await?)
    }

    pub async fn random_categories(&self, count: Option<i64>) -> Result<Vec<Category>, ApiError> {
        let count = count_param(count)?;
        Ok(self.store.random_categories(count).await?)
    }

    pub async fn category(&self, id: i64) -> Result<CategoryWithClues, ApiError> {
        let category = self
            .store
            .category(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("category {id} not found")))?;
        let clues = self
            .store
            .clues_in_category(id, self.hide_at)
            .await?
            .into_iter()
            .map(present)
            .collect();
        Ok(CategoryWithClues { category, clues })
    }

    /// Increments the clue's moderation counter; an unknown id changes nothing.
    pub async fn mark_invalid(&self, id: i64) -> Result<InvalidMark, ApiError> {
        let mark = self
            .store
            .mark_invalid(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("clue {id} not found")))?;
        tracing::info!(clue = id, invalid_count = mark.invalid_count, "clue flagged invalid");
        Ok(mark)
    }
}

fn count_param(raw: Option<i64>) -> Result<i64, ApiError> {
    let count = raw.unwrap_or(1);
    if (1..=MAX_PAGE).contains(&count) {
        Ok(count)
    } else {
        Err(ApiError::BadRequest(format!(
            "count must be between 1 and {MAX_PAGE}, got {count}"
        )))
    }
}

fn offset_param(raw: Option<i64>) -> Result<i64, ApiError> {
    match raw.unwrap_or(0) {
        n if n >= 0 => Ok(n),
        n => Err(ApiError::BadRequest(format!(
            "offset must not be negative, got {n}"
        ))),
    }
}

fn date_param(
    name: &str,
    raw: Option<&str>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(text) => parse_date_param(text)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("{name} is not a date: {text}"))),
    }
}

/// Legacy rows may hold the clue text in `answer` with an empty `question`.
fn present(mut clue: Clue) -> Clue {
    if clue.question.trim().is_empty() && !clue.answer.trim().is_empty() {
        clue.question = std::mem::take(&mut clue.answer);
    }
    clue
}

fn present_record(record: ClueRecord) -> ClueRecord {
    let ClueRecord { clue, category } = record;
    ClueRecord {
        clue: present(clue),
        category,
    }
}
