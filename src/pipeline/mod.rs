//! TSV archive to normalized categories/clues.
//!
//! parse -> assign ids -> drop small categories -> batched upsert.
pub mod assign;
pub mod filter;
pub mod report;
pub mod retry;
pub mod titles;
pub mod writer;

use crate::database_ops::memory::Snapshot;
use crate::database_ops::store::ClueStore;
use crate::normalization::{ParserOptions, SourceFormat, SourceRows};
use crate::util::env::{env_opt, env_parse};
use anyhow::Result;
use assign::{IdStart, ImportContext};
use chrono::{DateTime, Utc};
use filter::{retain_min_clues, Filtered, DEFAULT_MIN_CLUES};
use report::ImportReport;
use retry::BackoffPolicy;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use writer::{BatchWriter, MAX_BATCH_SIZE};

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_BUCKET: &str = "json_seasons";

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub parser: ParserOptions,
    pub batch_size: usize,
    pub min_clues: i32,
    pub id_start: IdStart,
    pub backoff: BackoffPolicy,
    /// Directory receiving bulk JSON files.
    pub bucket: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            parser: ParserOptions::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            min_clues: DEFAULT_MIN_CLUES,
            id_start: IdStart::default(),
            backoff: BackoffPolicy::default(),
            bucket: PathBuf::from(DEFAULT_BUCKET),
        }
    }
}

impl ImportConfig {
    /// Reads `IMPORT_*` and `JSERVICE_BUCKET`; unset or unparsable values keep defaults.
    pub fn from_env() -> Self {
        let defaults = BackoffPolicy::default();
        Self {
            parser: ParserOptions::default(),
            batch_size: env_parse("IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE).clamp(1, MAX_BATCH_SIZE),
            min_clues: env_parse("IMPORT_MIN_CLUES", DEFAULT_MIN_CLUES).max(1),
            id_start: IdStart::default(),
            backoff: BackoffPolicy {
                max_attempts: env_parse("IMPORT_MAX_ATTEMPTS", defaults.max_attempts).clamp(1, 10),
                base_delay: Duration::from_millis(env_parse(
                    "IMPORT_BACKOFF_MS",
                    defaults.base_delay.as_millis() as u64,
                )),
                max_delay: Duration::from_millis(env_parse(
                    "IMPORT_BACKOFF_CAP_MS",
                    defaults.max_delay.as_millis() as u64,
                )),
                call_timeout: Duration::from_secs(
                    env_parse("IMPORT_CALL_TIMEOUT_SECS", defaults.call_timeout.as_secs()).max(1),
                ),
            },
            bucket: env_opt("JSERVICE_BUCKET")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BUCKET)),
        }
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        let strip_currency = self.parser.value_rule.strip_currency;
        self.parser = ParserOptions::for_format(format);
        self.parser.value_rule.strip_currency |= strip_currency;
        self
    }
}

/// Parsed, id-assigned and filtered dataset, ready to write.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub run_at: DateTime<Utc>,
    pub rows_read: u64,
    pub rows_skipped: u64,
    pub categories_seen: usize,
    pub clues_seen: usize,
    pub data: Filtered,
}

impl Prepared {
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot {
            categories: self.data.categories,
            all_clues: self.data.clues,
        }
    }

    fn report(&self) -> ImportReport {
        ImportReport {
            rows_read: self.rows_read,
            rows_skipped: self.rows_skipped,
            categories_seen: self.categories_seen,
            clues_seen: self.clues_seen,
            categories_dropped: self.data.dropped_categories,
            clues_dropped: self.data.dropped_clues,
            ..ImportReport::default()
        }
    }
}

/// Single pass over the rows, then the whole-dataset size filter.
pub fn prepare<R: Read>(
    mut rows: SourceRows<R>,
    config: &ImportConfig,
    run_at: DateTime<Utc>,
) -> Result<Prepared> {
    let mut ctx = ImportContext::new(run_at, config.id_start);
    for row in rows.by_ref() {
        ctx.push(row?);
    }
    let assembled = ctx.finish();
    let categories_seen = assembled.categories.len();
    let clues_seen = assembled.clues.len();
    let data = retain_min_clues(assembled, config.min_clues);
    info!(
        rows = rows.rows_read(),
        skipped = rows.skipped(),
        categories_seen,
        clues_seen,
        categories_kept = data.categories.len(),
        clues_kept = data.clues.len(),
        "source prepared"
    );
    Ok(Prepared {
        run_at,
        rows_read: rows.rows_read(),
        rows_skipped: rows.skipped(),
        categories_seen,
        clues_seen,
        data,
    })
}

pub fn prepare_file(path: &Path, config: &ImportConfig) -> Result<Prepared> {
    let rows = SourceRows::open(path, config.parser)?;
    prepare(rows, config, Utc::now())
}

/// Writes a prepared dataset and reports what made it into the store.
pub async fn run_import(
    store: &dyn ClueStore,
    prepared: &Prepared,
    config: &ImportConfig,
) -> Result<ImportReport> {
    let writer = BatchWriter::new(store, config.batch_size, config.backoff);
    let outcome = writer
        .write(&prepared.data.categories, &prepared.data.clues)
        .await?;
    let report = ImportReport {
        categories_written: outcome.categories_written,
        clues_written: outcome.clues_written,
        clues_orphaned: outcome.clues_orphaned,
        failed_batches: outcome.failed,
        ..prepared.report()
    };
    info!(
        categories = report.categories_written,
        clues = report.clues_written,
        failed_batches = report.failed_batches.len(),
        "import finished"
    );
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonOutcome {
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub categories: usize,
    pub clues: usize,
    pub error: Option<String>,
}

/// Converts every `season*.tsv` in `dir` into `<bucket>/<stem>.json`.
/// A broken file is logged and skipped.
pub fn convert_seasons(dir: &Path, config: &ImportConfig) -> Result<Vec<SeasonOutcome>> {
    let mut sources: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            name.starts_with("season") && name.ends_with(".tsv")
        })
        .collect();
    sources.sort();

    let mut outcomes = Vec::with_capacity(sources.len());
    for source in sources {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("season")
            .to_string();
        let output = config.bucket.join(format!("{stem}.json"));
        let converted = prepare_file(&source, config).and_then(|prepared| {
            let counts = (prepared.data.categories.len(), prepared.data.clues.len());
            prepared.into_snapshot().write_to(&output)?;
            Ok(counts)
        });
        match converted {
            Ok((categories, clues)) => {
                info!(source = %source.display(), output = %output.display(), categories, clues, "season converted");
                outcomes.push(SeasonOutcome {
                    source,
                    output: Some(output),
                    categories,
                    clues,
                    error: None,
                });
            }
            Err(e) => {
                error!(source = %source.display(), error = %e, "season conversion failed");
                outcomes.push(SeasonOutcome {
                    source,
                    output: None,
                    categories: 0,
                    clues: 0,
                    error: Some(format!("{e:#}")),
                });
            }
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::memory::MemoryStore;
    use crate::database_ops::store::ClueStore;
    use crate::database_ops::testing::{FaultyStore, Op};
    use std::io::Cursor;

    const HEADER: &str = "round\tclue_value\tdaily_double_value\tcategory\tcomments\tanswer\tquestion\tair_date\tnotes\n";

    fn tsv(rows: &[(&str, &str)]) -> String {
        let mut out = HEADER.to_string();
        for (i, (category, value)) in rows.iter().enumerate() {
            out.push_str(&format!(
                "1\t{value}\t0\t{category}\tclue {i}\tanswer {i}\tq\t1999-0{}-01\t\n",
                i % 9 + 1
            ));
        }
        out
    }

    fn config() -> ImportConfig {
        ImportConfig {
            batch_size: 4,
            backoff: BackoffPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                call_timeout: Duration::from_secs(5),
            },
            ..ImportConfig::default()
        }
    }

    fn prepared(text: String, run_at: DateTime<Utc>) -> Prepared {
        let rows = SourceRows::from_reader(Cursor::new(text.into_bytes()), ParserOptions::default())
            .unwrap();
        prepare(rows, &config(), run_at).unwrap()
    }

    fn science_and_history() -> String {
        let mut rows = vec![("Science", "200"); 3];
        rows.extend(vec![("History", "400"); 5]);
        rows.push(("History", "oops"));
        tsv(&rows)
    }

    #[tokio::test]
    async fn import_keeps_only_large_categories() {
        let store = MemoryStore::new();
        let report = run_import(&store, &prepared(science_and_history(), Utc::now()), &config())
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.categories_dropped, 1);
        assert_eq!(report.clues_dropped, 3);
        assert_eq!(report.clues_written, 6);

        let snap = store.snapshot().await;
        assert_eq!(snap.categories.len(), 1);
        assert_eq!(snap.categories[0].title, "History");
        assert_eq!(snap.categories[0].clues_count, 6);
        // "History" was the second distinct title
        assert_eq!(snap.categories[0].id, 2);
        assert_eq!(snap.all_clues.last().unwrap().value, Some(200));
    }

    #[tokio::test]
    async fn rerunning_the_same_source_is_idempotent() {
        let store = MemoryStore::new();
        let first = prepared(science_and_history(), Utc::now());
        run_import(&store, &first, &config()).await.unwrap();
        let before = serde_json::to_value(store.snapshot().await).unwrap();

        let second = prepared(science_and_history(), Utc::now() + chrono::Duration::hours(1));
        run_import(&store, &second, &config()).await.unwrap();
        let after = serde_json::to_value(store.snapshot().await).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn rerunning_rows_with_unreadable_dates_keeps_the_first_airdate() {
        let mut text = HEADER.to_string();
        for i in 0..5 {
            text.push_str(&format!("1\t200\t0\tSCIENCE\tclue {i}\tanswer {i}\tq\tnot-a-date\t\n"));
        }
        let store = MemoryStore::new();
        let first_run = Utc::now();
        run_import(&store, &prepared(text.clone(), first_run), &config())
            .await
            .unwrap();
        let before = serde_json::to_value(store.snapshot().await).unwrap();

        let second_run = first_run + chrono::Duration::hours(1);
        run_import(&store, &prepared(text, second_run), &config())
            .await
            .unwrap();
        let snap = store.snapshot().await;
        assert_eq!(before, serde_json::to_value(&snap).unwrap());
        assert!(snap.all_clues.iter().all(|c| c.airdate == first_run));
    }

    #[tokio::test]
    async fn rows_with_blank_comments_are_imported_swapped() {
        let mut text = HEADER.to_string();
        for i in 0..6 {
            text.push_str(&format!("1\t200\t0\tSCIENCE\t\tThis gas {i}\thydrogen\t1984-09-10\n"));
        }
        let season = prepared(text, Utc::now());
        assert_eq!((season.rows_read, season.rows_skipped), (6, 0));

        let store = MemoryStore::new();
        let report = run_import(&store, &season, &config()).await.unwrap();
        assert_eq!(report.clues_written, 6);
        let snap = store.snapshot().await;
        assert_eq!(snap.all_clues[0].question, "This gas 0");
        assert_eq!(snap.all_clues[0].answer, "hydrogen");
    }

    #[tokio::test]
    async fn failing_category_batch_never_leaves_orphans() {
        let store = FaultyStore::new(MemoryStore::new());
        store.fail_next(Op::Categories, 3);
        let mut rows = vec![("A", "200"); 5];
        rows.extend(vec![("B", "200"); 5]);
        let cfg = ImportConfig {
            batch_size: 1,
            ..config()
        };
        let report = run_import(&store, &prepared(tsv(&rows), Utc::now()), &cfg)
            .await
            .unwrap();
        assert_eq!(report.failed_batches.len(), 1);
        assert_eq!(report.clues_orphaned, 5);
        assert_eq!(store.stats().await.unwrap().clues, 5);
        let snap = store.inner().snapshot().await;
        assert!(snap.all_clues.iter().all(|c| c.category_id == 2));
    }

    #[test]
    fn converts_each_season_file() {
        let src = tempfile::tempdir().unwrap();
        let bucket = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("season1.tsv"), tsv(&vec![("Art", "100"); 5])).unwrap();
        std::fs::write(src.path().join("season2.tsv"), "no header here\n").unwrap();
        std::fs::write(src.path().join("notes.txt"), "ignored").unwrap();

        let cfg = ImportConfig {
            bucket: bucket.path().to_path_buf(),
            ..config()
        };
        let outcomes = convert_seasons(src.path(), &cfg).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].clues, 5);
        assert!(outcomes[0].error.is_none());
        assert!(outcomes[1].error.is_some());

        let snap = Snapshot::read_from(&bucket.path().join("season1.json")).unwrap();
        assert_eq!(snap.categories.len(), 1);
        assert_eq!(snap.all_clues.len(), 5);
    }

    #[test]
    fn format_switch_keeps_explicit_currency_cleaning() {
        let mut cfg = ImportConfig::default();
        cfg.parser.value_rule.strip_currency = true;
        let cfg = cfg.with_format(SourceFormat::Seasons);
        assert!(cfg.parser.value_rule.strip_currency);
        let archive = ImportConfig::default().with_format(SourceFormat::Archive);
        assert_eq!(archive.parser.format, SourceFormat::Archive);
        assert!(archive.parser.value_rule.strip_currency);
    }
}
