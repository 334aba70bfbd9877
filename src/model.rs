// Category and clue records shared by the import pipeline, the stores and the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A named grouping of clues.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of clues attached to this category when it was last imported.
    pub clues_count: i32,
}

/// A single question/answer item. `value == None` marks a final-round clue.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Clue {
    pub id: i64,
    pub answer: String,
    pub question: String,
    pub value: Option<i32>,
    pub airdate: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category_id: i64,
    pub game_id: i64,
    pub invalid_count: Option<i32>,
    /// Set by the importer when the source date was missing or malformed and
    /// `airdate` holds the run timestamp instead. Never persisted.
    #[serde(skip)]
    #[sqlx(skip)]
    pub airdate_is_fallback: bool,
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Category {}

impl Hash for Category {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialEq for Clue {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Clue {}

impl Hash for Clue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Field contract violation found by `validate`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("id must be positive, got {0}")]
    NonPositiveId(i64),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("clues_count must not be negative, got {0}")]
    NegativeCount(i32),
}

impl Category {
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.id <= 0 {
            return Err(RecordError::NonPositiveId(self.id));
        }
        if self.title.trim().is_empty() {
            return Err(RecordError::Empty("title"));
        }
        if self.clues_count < 0 {
            return Err(RecordError::NegativeCount(self.clues_count));
        }
        Ok(())
    }

    /// True when the stored row differs from `other` in any imported field.
    /// Timestamps are ignored so a repeated import is a no-op.
    pub fn content_differs(&self, other: &Category) -> bool {
        self.title != other.title || self.clues_count != other.clues_count
    }
}

impl Clue {
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.id <= 0 {
            return Err(RecordError::NonPositiveId(self.id));
        }
        if self.category_id <= 0 {
            return Err(RecordError::NonPositiveId(self.category_id));
        }
        if self.question.trim().is_empty() {
            return Err(RecordError::Empty("question"));
        }
        if self.answer.trim().is_empty() {
            return Err(RecordError::Empty("answer"));
        }
        Ok(())
    }

    pub fn is_final_round(&self) -> bool {
        self.value.is_none()
    }

    /// Same as [`Category::content_differs`]; moderation state is not compared.
    /// A fallback airdate on the incoming row never counts as a change.
    pub fn content_differs(&self, incoming: &Clue) -> bool {
        self.answer != incoming.answer
            || self.question != incoming.question
            || self.value != incoming.value
            || (!incoming.airdate_is_fallback && self.airdate != incoming.airdate)
            || self.category_id != incoming.category_id
            || self.game_id != incoming.game_id
    }
}

/// Read-path clue with its category embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClueRecord {
    #[serde(flatten)]
    pub clue: Clue,
    pub category: Option<Category>,
}

/// A category together with its visible clues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWithClues {
    #[serde(flatten)]
    pub category: Category,
    pub clues: Vec<Clue>,
}

/// Result of the moderation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidMark {
    pub id: i64,
    pub invalid_count: i32,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_is_by_id() {
        let a = category(7, "Science", 5);
        let mut b = category(7, "History", 9);
        assert_eq!(a, b);
        b.id = 8;
        assert_ne!(a, b);

        let set: HashSet<Clue> = [clue(1, 7, Some(200)), clue(1, 8, None)].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn validate_rejects_blank_text() {
        let mut c = clue(3, 1, Some(400));
        assert!(c.validate().is_ok());
        c.question = "   ".into();
        assert_eq!(c.validate(), Err(RecordError::Empty("question")));

        let cat = category(0, "Science", 5);
        assert_eq!(cat.validate(), Err(RecordError::NonPositiveId(0)));
    }

    #[test]
    fn final_round_has_no_value() {
        assert!(clue(1, 1, None).is_final_round());
        assert!(!clue(1, 1, Some(200)).is_final_round());
    }

    #[test]
    fn content_comparison_ignores_moderation() {
        let a = clue(1, 1, Some(200));
        let mut b = a.clone();
        b.invalid_count = Some(3);
        b.updated_at = Utc::now();
        assert!(!a.content_differs(&b));
        b.value = Some(400);
        assert!(a.content_differs(&b));
    }

    #[test]
    fn fallback_airdate_is_not_a_change() {
        let stored = clue(1, 1, Some(200));
        let mut incoming = stored.clone();
        incoming.airdate = ts() + chrono::Duration::hours(1);
        assert!(stored.content_differs(&incoming));
        incoming.airdate_is_fallback = true;
        assert!(!stored.content_differs(&incoming));
        incoming.answer = "changed".into();
        assert!(stored.content_differs(&incoming));
    }
}
