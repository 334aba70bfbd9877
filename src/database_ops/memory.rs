//! In-memory store backed by ordered maps, loadable from a JSON snapshot.
//!
//! Serves the API without a database and stands in for Postgres in tests.
use crate::database_ops::store::{
    is_visible, ClueFilter, ClueStore, StoreError, StoreResult, StoreStats,
};
use crate::model::{Category, Clue, ClueRecord, InvalidMark};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;

/// JSON document holding a full import result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub categories: Vec<Category>,
    pub all_clues: Vec<Clue>,
}

impl Snapshot {
    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("parse {}", path.display()))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, body).with_context(|| format!("write {}", path.display()))
    }
}

#[derive(Debug, Default)]
struct Tables {
    categories: BTreeMap<i64, Category>,
    clues: BTreeMap<i64, Clue>,
}

impl Tables {
    fn record(&self, clue: &Clue) -> ClueRecord {
        ClueRecord {
            clue: clue.clone(),
            category: self.categories.get(&clue.category_id).cloned(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a snapshot, rejecting clues without their category.
    pub fn from_snapshot(snapshot: Snapshot) -> StoreResult<Self> {
        let mut tables = Tables::default();
        for c in snapshot.categories {
            c.validate()
                .map_err(|e| StoreError::Integrity(format!("category {}: {e}", c.id)))?;
            tables.categories.insert(c.id, c);
        }
        for clue in snapshot.all_clues {
            if !tables.categories.contains_key(&clue.category_id) {
                return Err(StoreError::Integrity(format!(
                    "clue {} references missing category {}",
                    clue.id, clue.category_id
                )));
            }
            tables.clues.insert(clue.id, clue);
        }
        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let snapshot = Snapshot::read_from(path)?;
        Self::from_snapshot(snapshot).with_context(|| format!("load {}", path.display()))
    }

    pub async fn snapshot(&self) -> Snapshot {
        let tables = self.tables.read().await;
        Snapshot {
            categories: tables.categories.values().cloned().collect(),
            all_clues: tables.clues.values().cloned().collect(),
        }
    }
}

fn sample<T: Clone>(items: Vec<&T>, count: usize) -> Vec<T> {
    let mut rng = rand::thread_rng();
    let mut picked: Vec<T> = items
        .choose_multiple(&mut rng, count)
        .map(|item| (*item).clone())
        .collect();
    picked.shuffle(&mut rng);
    picked
}

fn page_bounds(offset: i64, count: i64) -> (usize, usize) {
    (offset.max(0) as usize, count.max(0) as usize)
}

#[async_trait]
impl ClueStore for MemoryStore {
    async fn upsert_categories(&self, rows: &[Category]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        for row in rows {
            match tables.categories.get_mut(&row.id) {
                Some(existing) => {
                    if existing.content_differs(row) {
                        existing.title = row.title.clone();
                        existing.clues_count = row.clues_count;
                        existing.updated_at = row.updated_at;
                    }
                }
                None => {
                    tables.categories.insert(row.id, row.clone());
                }
            }
        }
        Ok(())
    }

    async fn upsert_clues(&self, rows: &[Clue]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(orphan) = rows
            .iter()
            .find(|c| !tables.categories.contains_key(&c.category_id))
        {
            return Err(StoreError::Integrity(format!(
                "clue {} references missing category {}",
                orphan.id, orphan.category_id
            )));
        }
        for row in rows {
            match tables.clues.get_mut(&row.id) {
                Some(existing) => {
                    if existing.content_differs(row) {
                        let created_at = existing.created_at;
                        let invalid_count = existing.invalid_count;
                        let airdate = existing.airdate;
                        *existing = row.clone();
                        existing.created_at = created_at;
                        existing.invalid_count = invalid_count;
                        if row.airdate_is_fallback {
                            existing.airdate = airdate;
                        }
                    }
                }
                None => {
                    tables.clues.insert(row.id, row.clone());
                }
            }
        }
        Ok(())
    }

    async fn category(&self, id: i64) -> StoreResult<Option<Category>> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn clues_in_category(&self, id: i64, hide_at: i32) -> StoreResult<Vec<Clue>> {
        let tables = self.tables.read().await;
        Ok(tables
            .clues
            .values()
            .filter(|c| c.category_id == id && is_visible(c, hide_at))
            .cloned()
            .collect())
    }

    async fn list_categories(&self, offset: i64, count: i64) -> StoreResult<Vec<Category>> {
        let (skip, take) = page_bounds(offset, count);
        let tables = self.tables.read().await;
        Ok(tables
            .categories
            .values()
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn random_categories(&self, count: i64) -> StoreResult<Vec<Category>> {
        let tables = self.tables.read().await;
        let all: Vec<&Category> = tables.categories.values().collect();
        Ok(sample(all, count.max(0) as usize))
    }

    async fn random_clues(
        &self,
        count: i64,
        final_only: bool,
        hide_at: i32,
    ) -> StoreResult<Vec<ClueRecord>> {
        let tables = self.tables.read().await;
        let pool: Vec<&Clue> = tables
            .clues
            .values()
            .filter(|c| is_visible(c, hide_at) && (!final_only || c.is_final_round()))
            .collect();
        let picked = sample(pool, count.max(0) as usize);
        Ok(picked.iter().map(|c| tables.record(c)).collect())
    }

    async fn list_clues(&self, filter: &ClueFilter) -> StoreResult<Vec<ClueRecord>> {
        let (skip, take) = page_bounds(filter.offset, filter.limit);
        let tables = self.tables.read().await;
        Ok(tables
            .clues
            .values()
            .filter(|c| filter.matches(c))
            .skip(skip)
            .take(take)
            .map(|c| tables.record(c))
            .collect())
    }

    async fn mark_invalid(&self, id: i64) -> StoreResult<Option<InvalidMark>> {
        let mut tables = self.tables.write().await;
        Ok(tables.clues.get_mut(&id).map(|clue| {
            let next = clue.invalid_count.unwrap_or(0) + 1;
            clue.invalid_count = Some(next);
            InvalidMark {
                id,
                invalid_count: next,
            }
        }))
    }

    async fn rename_category(&self, id: i64, title: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(match tables.categories.get_mut(&id) {
            Some(c) => {
                c.title = title.to_string();
                c.updated_at = chrono::Utc::now();
                true
            }
            None => false,
        })
    }

    async fn category_titles(&self) -> StoreResult<Vec<(i64, String)>> {
        let tables = self.tables.read().await;
        Ok(tables
            .categories
            .values()
            .map(|c| (c.id, c.title.clone()))
            .collect())
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let tables = self.tables.read().await;
        Ok(StoreStats {
            categories: tables.categories.len() as i64,
            clues: tables.clues.len() as i64,
        })
    }
}
