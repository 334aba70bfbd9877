use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use jservice::database_ops::db::Db;
use jservice::normalization::SourceFormat;
use jservice::pipeline::assign::IdStart;
use jservice::pipeline::titles::clean_titles;
use jservice::pipeline::{self, ImportConfig};
use jservice::util::env;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "jservice", version, about = "jService clue archive tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Parse a TSV archive and upsert its categories and clues
    Import {
        /// Tab-separated source file
        path: PathBuf,
        #[command(flatten)]
        source: SourceArgs,
        /// Rows per batch write (1..=5000)
        #[arg(long, env = "IMPORT_BATCH_SIZE")]
        batch_size: Option<usize>,
        /// Attempts per batch before it is recorded as failed
        #[arg(long, env = "IMPORT_MAX_ATTEMPTS")]
        max_attempts: Option<u32>,
        /// Create tables and indexes before importing
        #[arg(long, default_value_t = false)]
        init_schema: bool,
        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Convert every season*.tsv in a directory into per-season JSON files
    ConvertSeasons {
        dir: PathBuf,
        /// Output directory (defaults to JSERVICE_BUCKET or json_seasons)
        #[arg(long)]
        bucket: Option<PathBuf>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Write a JSON snapshot of a TSV archive without touching the database
    Export {
        path: PathBuf,
        #[arg(long, default_value = "jservice_data.json")]
        out: PathBuf,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Replace category titles polluted by host commentary
    CleanTitles {
        /// Only report what would change
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Create the categories/clues tables and indexes if absent
    InitSchema {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Seasons,
    Archive,
}

impl From<FormatArg> for SourceFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Seasons => SourceFormat::Seasons,
            FormatArg::Archive => SourceFormat::Archive,
        }
    }
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Source layout
    #[arg(long, value_enum, default_value_t = FormatArg::Seasons)]
    format: FormatArg,
    /// Strip `$` and `,` from values (always on for archive files)
    #[arg(long, default_value_t = false)]
    strip_currency: bool,
    /// Categories with fewer clues are dropped
    #[arg(long, env = "IMPORT_MIN_CLUES")]
    min_clues: Option<i32>,
    /// First category id handed out
    #[arg(long, default_value_t = 1)]
    category_id_start: i64,
    /// First clue id handed out
    #[arg(long, default_value_t = 1)]
    clue_id_start: i64,
}

impl SourceArgs {
    fn apply(&self, mut cfg: ImportConfig) -> Result<ImportConfig> {
        if self.category_id_start < 1 || self.clue_id_start < 1 {
            bail!("id starts must be positive");
        }
        cfg.parser.value_rule.strip_currency = self.strip_currency;
        cfg = cfg.with_format(self.format.into());
        if let Some(min) = self.min_clues {
            cfg.min_clues = min.max(1);
        }
        cfg.id_start = IdStart {
            category: self.category_id_start,
            clue: self.clue_id_start,
        };
        Ok(cfg)
    }
}

async fn connect(db_url: Option<String>) -> Result<Db> {
    let url = match db_url {
        Some(url) => url,
        None => env::db_url()?,
    };
    let max_connections: u32 = env::env_parse("DB_MAX_CONNS", 10u32);
    Db::connect(&url, max_connections)
        .await
        .context("connect to database")
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    jservice::tracing::init_tracing(jservice::tracing::DEFAULT_FILTER)?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            path,
            source,
            batch_size,
            max_attempts,
            init_schema,
            json,
            db_url,
        } => {
            env::preflight_check(
                "import",
                &[],
                &[
                    "DATABASE_URL",
                    "IMPORT_BATCH_SIZE",
                    "IMPORT_MAX_ATTEMPTS",
                    "IMPORT_MIN_CLUES",
                    "IMPORT_BACKOFF_MS",
                    "IMPORT_CALL_TIMEOUT_SECS",
                ],
            )?;
            let mut cfg = source.apply(ImportConfig::from_env())?;
            if let Some(size) = batch_size {
                cfg.batch_size = size.clamp(1, pipeline::writer::MAX_BATCH_SIZE);
            }
            if let Some(attempts) = max_attempts {
                cfg.backoff.max_attempts = attempts.clamp(1, 10);
            }

            let db = connect(db_url).await?;
            if init_schema {
                db.ensure_schema().await?;
            }
            let prepared = pipeline::prepare_file(&path, &cfg)?;
            let report = pipeline::run_import(&db, &prepared, &cfg).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{report}");
            }
            if !report.is_complete() {
                bail!(
                    "import incomplete: {} failed batches, {} orphaned clues",
                    report.failed_batches.len(),
                    report.clues_orphaned
                );
            }
        }
        Commands::ConvertSeasons {
            dir,
            bucket,
            source,
        } => {
            let mut cfg = source.apply(ImportConfig::from_env())?;
            if let Some(bucket) = bucket {
                cfg.bucket = bucket;
            }
            let outcomes = pipeline::convert_seasons(&dir, &cfg)?;
            let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
            for o in &outcomes {
                match (&o.output, &o.error) {
                    (Some(out), _) => println!(
                        "{} -> {} ({} categories, {} clues)",
                        o.source.display(),
                        out.display(),
                        o.categories,
                        o.clues
                    ),
                    (None, Some(err)) => println!("{} FAILED: {err}", o.source.display()),
                    (None, None) => {}
                }
            }
            info!(files = outcomes.len(), failed, "season conversion done");
        }
        Commands::Export { path, out, source } => {
            let cfg = source.apply(ImportConfig::from_env())?;
            let prepared = pipeline::prepare_file(&path, &cfg)?;
            let (categories, clues) = (prepared.data.categories.len(), prepared.data.clues.len());
            prepared.into_snapshot().write_to(&out)?;
            println!(
                "wrote {} ({categories} categories, {clues} clues)",
                out.display()
            );
        }
        Commands::CleanTitles { dry_run, db_url } => {
            let db = connect(db_url).await?;
            let renames = clean_titles(&db, dry_run).await?;
            for r in &renames {
                println!("{}: {:?} -> {:?}", r.id, r.from, r.to);
            }
            println!(
                "{} {} titles",
                if dry_run { "would clean" } else { "cleaned" },
                renames.len()
            );
        }
        Commands::InitSchema { db_url } => {
            let db = connect(db_url).await?;
            db.ensure_schema().await?;
            println!("schema ready");
        }
    }

    Ok(())
}
