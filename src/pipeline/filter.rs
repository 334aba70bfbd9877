use crate::model::{Category, Clue};
use crate::pipeline::assign::Assembled;
use std::collections::HashMap;

/// Default minimum number of clues a category needs to be kept.
pub const DEFAULT_MIN_CLUES: i32 = 5;

/// Output of the size filter. Kept categories carry exact clue counts.
#[derive(Debug, Clone, Default)]
pub struct Filtered {
    pub categories: Vec<Category>,
    pub clues: Vec<Clue>,
    pub dropped_categories: usize,
    pub dropped_clues: usize,
}

/// Drops categories with fewer than `min_clues` clues, and their clues with them.
///
/// Needs the whole dataset: a category's count is final only after the last row.
pub fn retain_min_clues(assembled: Assembled, min_clues: i32) -> Filtered {
    let mut counts: HashMap<i64, i32> = HashMap::new();
    for clue in &assembled.clues {
        *counts.entry(clue.category_id).or_insert(0) += 1;
    }

    let total_categories = assembled.categories.len();
    let categories: Vec<Category> = assembled
        .categories
        .into_iter()
        .filter_map(|mut c| {
            let count = counts.get(&c.id).copied().unwrap_or(0);
            (count >= min_clues).then(|| {
                c.clues_count = count;
                c
            })
        })
        .collect();

    let total_clues = assembled.clues.len();
    let clues: Vec<Clue> = assembled
        .clues
        .into_iter()
        .filter(|c| counts.get(&c.category_id).copied().unwrap_or(0) >= min_clues)
        .collect();

    Filtered {
        dropped_categories: total_categories - categories.len(),
        dropped_clues: total_clues - clues.len(),
        categories,
        clues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::assign::tests::row;
    use crate::pipeline::assign::{IdStart, ImportContext};
    use chrono::Utc;

    fn assemble(titles: &[(&str, usize)]) -> Assembled {
        let mut ctx = ImportContext::new(Utc::now(), IdStart::default());
        for (title, n) in titles {
            for _ in 0..*n {
                ctx.push(row(title, "2001-05-05"));
            }
        }
        ctx.finish()
    }

    #[test]
    fn small_categories_are_dropped_with_their_clues() {
        let out = retain_min_clues(assemble(&[("Science", 3), ("History", 6)]), 5);
        assert_eq!(out.categories.len(), 1);
        assert_eq!(out.categories[0].title, "History");
        assert_eq!(out.categories[0].clues_count, 6);
        assert_eq!(out.clues.len(), 6);
        assert!(out.clues.iter().all(|c| c.category_id == out.categories[0].id));
        assert_eq!((out.dropped_categories, out.dropped_clues), (1, 3));
    }

    #[test]
    fn counts_match_retained_clues() {
        let out = retain_min_clues(assemble(&[("A", 5), ("B", 4), ("C", 7), ("D", 1)]), 5);
        for cat in &out.categories {
            let n = out.clues.iter().filter(|c| c.category_id == cat.id).count() as i32;
            assert_eq!(cat.clues_count, n);
            assert!(n >= 5);
        }
        let titles: Vec<&str> = out.categories.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);
    }

    #[test]
    fn threshold_is_configurable() {
        let out = retain_min_clues(assemble(&[("Quiz", 4), ("Tiny", 3)]), 4);
        assert_eq!(out.categories.len(), 1);
        assert_eq!(out.categories[0].title, "Quiz");
    }

    #[test]
    fn every_clue_references_a_kept_category() {
        let out = retain_min_clues(assemble(&[("A", 2), ("B", 9), ("A", 3)]), 5);
        let kept: Vec<i64> = out.categories.iter().map(|c| c.id).collect();
        assert!(out.clues.iter().all(|c| kept.contains(&c.category_id)));
        // "A" reaches 5 across non-adjacent rows
        assert_eq!(kept.len(), 2);
    }
}
