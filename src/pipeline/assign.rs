//! Category deduplication and synthetic id assignment.
//!
//! One pass over the parsed rows: every distinct category title gets the next
//! category id in first-seen order, every row gets the next clue id. All
//! working state lives in [`ImportContext`], owned by a single import run.
use crate::model::{Category, Clue};
use crate::normalization::SourceRow;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashMap;

/// First ids handed out by a run. Lets separate runs occupy disjoint ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdStart {
    pub category: i64,
    pub clue: i64,
}

impl Default for IdStart {
    fn default() -> Self {
        Self {
            category: 1,
            clue: 1,
        }
    }
}

/// Everything one pass produced, before the size filter.
#[derive(Debug, Clone, Default)]
pub struct Assembled {
    pub categories: Vec<Category>,
    pub clues: Vec<Clue>,
}

#[derive(Debug)]
pub struct ImportContext {
    run_at: DateTime<Utc>,
    titles: IndexMap<String, i64>,
    clue_counts: HashMap<i64, i32>,
    games: HashMap<String, i64>,
    next_category: i64,
    next_clue: i64,
    next_game: i64,
    clues: Vec<Clue>,
}

impl ImportContext {
    pub fn new(run_at: DateTime<Utc>, start: IdStart) -> Self {
        Self {
            run_at,
            titles: IndexMap::new(),
            clue_counts: HashMap::new(),
            games: HashMap::new(),
            next_category: start.category,
            next_clue: start.clue,
            next_game: 1,
            clues: Vec::new(),
        }
    }

    /// Looks up or assigns the category id for an exact (case-sensitive) title.
    pub fn category_id(&mut self, title: &str) -> i64 {
        if let Some(id) = self.titles.get(title) {
            return *id;
        }
        let id = self.next_category;
        self.next_category += 1;
        self.titles.insert(title.to_string(), id);
        id
    }

    /// Explicit game ids win; otherwise one id per distinct air date, in first-seen order.
    fn game_id(&mut self, row: &SourceRow) -> i64 {
        if let Some(id) = row.game_id {
            return id;
        }
        if let Some(id) = self.games.get(&row.airdate_raw) {
            return *id;
        }
        let id = self.next_game;
        self.next_game += 1;
        self.games.insert(row.airdate_raw.clone(), id);
        id
    }

    /// Records one row as a clue and returns its id.
    pub fn push(&mut self, row: SourceRow) -> i64 {
        let category_id = self.category_id(&row.category);
        let game_id = self.game_id(&row);
        let id = self.next_clue;
        self.next_clue += 1;
        *self.clue_counts.entry(category_id).or_insert(0) += 1;
        self.clues.push(Clue {
            id,
            answer: row.answer,
            question: row.question,
            value: row.value,
            airdate: row.airdate.unwrap_or(self.run_at),
            created_at: self.run_at,
            updated_at: self.run_at,
            category_id,
            game_id,
            invalid_count: Some(0),
            airdate_is_fallback: row.airdate.is_none(),
        });
        id
    }

    pub fn clue_count(&self, category_id: i64) -> i32 {
        self.clue_counts.get(&category_id).copied().unwrap_or(0)
    }

    /// Consumes the context, emitting categories in id order with their running counts.
    pub fn finish(self) -> Assembled {
        let run_at = self.run_at;
        let counts = self.clue_counts;
        let categories = self
            .titles
            .into_iter()
            .map(|(title, id)| Category {
                id,
                title,
                created_at: run_at,
                updated_at: run_at,
                clues_count: counts.get(&id).copied().unwrap_or(0),
            })
            .collect();
        Assembled {
            categories,
            clues: self.clues,
        }
    }
}
