use crate::database_ops::store::{ClueStore, StoreError};
use crate::model::{Category, Clue};
use crate::pipeline::report::{BatchKind, FailedBatch};
use crate::pipeline::retry::{retry_with_backoff, BackoffPolicy};
use anyhow::{anyhow, Result};
use std::collections::HashSet;
use tracing::{error, info};

/// Largest batch accepted; keeps a clue upsert under Postgres' bind parameter limit.
pub const MAX_BATCH_SIZE: usize = 5000;

#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    pub categories_written: usize,
    pub clues_written: usize,
    pub clues_orphaned: usize,
    pub failed: Vec<FailedBatch>,
}

/// Persists categories, then clues, in bounded batches with retry.
///
/// A clue is only sent once its category is confirmed written; clues of a
/// category batch that exhausted its retries are held back and counted.
pub struct BatchWriter<'a> {
    store: &'a dyn ClueStore,
    batch_size: usize,
    policy: BackoffPolicy,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn ClueStore, batch_size: usize, policy: BackoffPolicy) -> Self {
        Self {
            store,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            policy,
        }
    }

    pub async fn write(&self, categories: &[Category], clues: &[Clue]) -> Result<WriteOutcome> {
        for c in categories {
            c.validate()
                .map_err(|e| anyhow!("refusing to write category {}: {e}", c.id))?;
        }
        for c in clues {
            c.validate()
                .map_err(|e| anyhow!("refusing to write clue {}: {e}", c.id))?;
        }

        let mut out = WriteOutcome::default();
        let mut failed_categories: HashSet<i64> = HashSet::new();

        let batches = categories.len().div_ceil(self.batch_size);
        for (idx, chunk) in categories.chunks(self.batch_size).enumerate() {
            let label = format!("categories batch {}/{}", idx + 1, batches);
            let result =
                retry_with_backoff(&self.policy, &label, || self.store.upsert_categories(chunk))
                    .await;
            match result {
                Ok(((), attempts)) => {
                    out.categories_written += chunk.len();
                    info!(
                        batch = idx + 1,
                        batches,
                        attempts,
                        written = out.categories_written,
                        total = categories.len(),
                        "categories batch written"
                    );
                }
                Err(failure) => {
                    if let StoreError::Integrity(msg) = &failure.error {
                        return Err(anyhow!("integrity violation writing {label}: {msg}"));
                    }
                    failed_categories.extend(chunk.iter().map(|c| c.id));
                    out.failed.push(failed_batch(
                        BatchKind::Categories,
                        chunk.iter().map(|c| c.id),
                        failure.attempts,
                        &failure.error,
                    ));
                }
            }
        }

        let (ready, orphaned): (Vec<&Clue>, Vec<&Clue>) = clues
            .iter()
            .partition(|c| !failed_categories.contains(&c.category_id));
        out.clues_orphaned = orphaned.len();
        if !orphaned.is_empty() {
            error!(
                orphaned = orphaned.len(),
                "holding back clues whose category batch failed"
            );
        }

        let batches = ready.len().div_ceil(self.batch_size);
        for (idx, chunk) in ready.chunks(self.batch_size).enumerate() {
            let label = format!("clues batch {}/{}", idx + 1, batches);
            // only one batch is ever copied out of the caller's slice
            let batch: Vec<Clue> = chunk.iter().map(|c| (*c).clone()).collect();
            let result =
                retry_with_backoff(&self.policy, &label, || self.store.upsert_clues(&batch)).await;
            match result {
                Ok(((), attempts)) => {
                    out.clues_written += chunk.len();
                    info!(
                        batch = idx + 1,
                        batches,
                        attempts,
                        written = out.clues_written,
                        total = ready.len(),
                        "clues batch written"
                    );
                }
                Err(failure) => {
                    // categories precede their clues, so this is a bug, not bad luck
                    if let StoreError::Integrity(msg) = &failure.error {
                        return Err(anyhow!("integrity violation writing {label}: {msg}"));
                    }
                    out.failed.push(failed_batch(
                        BatchKind::Clues,
                        chunk.iter().map(|c| c.id),
                        failure.attempts,
                        &failure.error,
                    ));
                }
            }
        }

        Ok(out)
    }
}

fn failed_batch(
    kind: BatchKind,
    mut ids: impl Iterator<Item = i64>,
    attempts: u32,
    err: &StoreError,
) -> FailedBatch {
    let first_id = ids.next().unwrap_or_default();
    let (last_id, rows) = ids.fold((first_id, 1usize), |(_, n), id| (id, n + 1));
    error!(%kind, first_id, last_id, rows, attempts, error = %err, "batch failed after retries; continuing");
    FailedBatch {
        kind,
        first_id,
        last_id,
        rows,
        attempts,
        error: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::memory::MemoryStore;
    use crate::database_ops::testing::{FaultyStore, Op};
    use crate::model::fixtures::{category, clue};
    use std::time::Duration;

    fn policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            call_timeout: Duration::from_secs(5),
        }
    }

    fn dataset() -> (Vec<Category>, Vec<Clue>) {
        let categories = (1..=4).map(|id| category(id, &format!("C{id}"), 5)).collect();
        let clues = (1..=20).map(|id| clue(id, (id - 1) / 5 + 1, Some(200))).collect();
        (categories, clues)
    }

    #[tokio::test]
    async fn writes_everything_in_batches() {
        let store = FaultyStore::new(MemoryStore::new());
        let (cats, clues) = dataset();
        let out = BatchWriter::new(&store, 3, policy(3))
            .write(&cats, &clues)
            .await
            .unwrap();
        assert_eq!((out.categories_written, out.clues_written), (4, 20));
        assert!(out.failed.is_empty());
        // 4 categories in batches of 3, 20 clues in batches of 3
        assert_eq!(store.calls(Op::Categories), 2);
        assert_eq!(store.calls(Op::Clues), 7);
    }

    #[tokio::test]
    async fn clue_batches_stay_bounded_after_holding_back_orphans() {
        let store = FaultyStore::new(MemoryStore::new());
        store.fail_next(Op::Categories, 3);
        let (cats, clues) = dataset();
        let out = BatchWriter::new(&store, 2, policy(3))
            .write(&cats, &clues)
            .await
            .unwrap();
        assert_eq!(out.clues_orphaned, 10);
        assert_eq!(out.clues_written, 10);
        assert_eq!(store.calls(Op::Clues), 5);
        assert_eq!(store.largest_batch(Op::Clues), 2);

        let store = FaultyStore::new(MemoryStore::new());
        let out = BatchWriter::new(&store, 6, policy(3))
            .write(&cats, &clues)
            .await
            .unwrap();
        assert_eq!(out.clues_written, 20);
        assert_eq!(store.calls(Op::Clues), 4);
        assert_eq!(store.largest_batch(Op::Clues), 6);
        let ids: Vec<i64> = store
            .inner()
            .snapshot()
            .await
            .all_clues
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn transient_failures_are_retried_to_the_same_state() {
        let (cats, clues) = dataset();

        let clean = MemoryStore::new();
        BatchWriter::new(&clean, 50, policy(4))
            .write(&cats, &clues)
            .await
            .unwrap();

        let flaky = FaultyStore::new(MemoryStore::new());
        flaky.fail_next(Op::Clues, 2);
        let out = BatchWriter::new(&flaky, 50, policy(4))
            .write(&cats, &clues)
            .await
            .unwrap();
        assert!(out.failed.is_empty());
        assert_eq!(flaky.calls(Op::Clues), 3);
        assert!(flaky.calls(Op::Clues) <= 4);

        let a = clean.snapshot().await;
        let b = flaky.inner().snapshot().await;
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[tokio::test]
    async fn exhausted_category_batch_holds_back_its_clues() {
        let store = FaultyStore::new(MemoryStore::new());
        store.fail_next(Op::Categories, 3);
        let (cats, clues) = dataset();
        let out = BatchWriter::new(&store, 2, policy(3))
            .write(&cats, &clues)
            .await
            .unwrap();

        assert_eq!(out.failed.len(), 1);
        let failed = &out.failed[0];
        assert_eq!(failed.kind, BatchKind::Categories);
        assert_eq!((failed.first_id, failed.last_id, failed.rows), (1, 2, 2));
        assert_eq!(failed.attempts, 3);
        assert_eq!(out.categories_written, 2);
        assert_eq!(out.clues_orphaned, 10);
        assert_eq!(out.clues_written, 10);

        let snap = store.inner().snapshot().await;
        let kept: HashSet<i64> = snap.categories.iter().map(|c| c.id).collect();
        assert!(snap.all_clues.iter().all(|c| kept.contains(&c.category_id)));
    }

    #[tokio::test]
    async fn exhausted_clue_batch_is_skipped_and_run_continues() {
        let store = FaultyStore::new(MemoryStore::new());
        store.fail_next(Op::Clues, 2);
        let (cats, clues) = dataset();
        let out = BatchWriter::new(&store, 10, policy(2))
            .write(&cats, &clues)
            .await
            .unwrap();
        assert_eq!(out.failed.len(), 1);
        assert_eq!(out.failed[0].kind, BatchKind::Clues);
        assert_eq!((out.failed[0].first_id, out.failed[0].last_id), (1, 10));
        assert_eq!(out.clues_written, 10);
    }

    #[tokio::test]
    async fn invalid_records_are_refused_before_any_write() {
        let store = FaultyStore::new(MemoryStore::new());
        let (cats, mut clues) = dataset();
        clues[7].answer = "  ".into();
        let err = BatchWriter::new(&store, 10, policy(3))
            .write(&cats, &clues)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("clue 8"));
        assert_eq!(store.calls(Op::Categories), 0);
    }

    #[tokio::test]
    async fn integrity_violation_aborts() {
        let store = MemoryStore::new();
        let err = BatchWriter::new(&store, 10, policy(3))
            .write(&[], &[clue(1, 42, Some(200))])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("integrity"));
    }
}
