use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Categories,
    Clues,
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BatchKind::Categories => "categories",
            BatchKind::Clues => "clues",
        })
    }
}

/// A batch that was still failing after the last retry.
#[derive(Debug, Clone, Serialize)]
pub struct FailedBatch {
    pub kind: BatchKind,
    pub first_id: i64,
    pub last_id: i64,
    pub rows: usize,
    pub attempts: u32,
    pub error: String,
}

/// Operator-facing summary of one import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub rows_read: u64,
    pub rows_skipped: u64,
    pub categories_seen: usize,
    pub clues_seen: usize,
    pub categories_dropped: usize,
    pub clues_dropped: usize,
    pub categories_written: usize,
    pub clues_written: usize,
    /// Clues held back because their category batch never made it to the store.
    pub clues_orphaned: usize,
    pub failed_batches: Vec<FailedBatch>,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty() && self.clues_orphaned == 0
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "rows read: {} (skipped {})",
            self.rows_read, self.rows_skipped
        )?;
        writeln!(
            f,
            "categories: {} seen, {} below threshold, {} written",
            self.categories_seen, self.categories_dropped, self.categories_written
        )?;
        writeln!(
            f,
            "clues: {} seen, {} dropped with their category, {} written, {} orphaned",
            self.clues_seen, self.clues_dropped, self.clues_written, self.clues_orphaned
        )?;
        if self.failed_batches.is_empty() {
            write!(f, "failed batches: none")
        } else {
            write!(f, "failed batches: {}", self.failed_batches.len())?;
            for b in &self.failed_batches {
                write!(
                    f,
                    "\n  {} ids {}..={} ({} rows, {} attempts): {}",
                    b.kind, b.first_id, b.last_id, b.rows, b.attempts, b.error
                )?;
            }
            Ok(())
        }
    }
}
