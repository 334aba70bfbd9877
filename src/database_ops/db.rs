use crate::database_ops::store::{ClueFilter, ClueStore, StoreError, StoreResult, StoreStats};
use crate::model::{Category, Clue, ClueRecord, InvalidMark};
use crate::util::env::{env_flag, env_parse};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, Postgres, QueryBuilder,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

const SCHEMA_SQL: &str = include_str!("../../migrations/0001_create_trivia.sql");

/// Postgres SQLSTATE for foreign_key_violation.
const FK_VIOLATION: &str = "23503";

const CLUE_COLUMNS: &str = "cl.id, cl.answer, cl.question, cl.value, cl.airdate, cl.created_at, \
     cl.updated_at, cl.category_id, cl.game_id, cl.invalid_count, \
     c.title AS category_title, c.created_at AS category_created_at, \
     c.updated_at AS category_updated_at, c.clues_count AS category_clues_count";

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        // Ensure TLS is enabled when DSN contains sslmode=require
        if database_url.contains("sslmode=require") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !env_flag("USE_PREPARED", false) {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        // Optional fast-ingest session tuning for bulk imports
        let fast_ingest = env_flag("FAST_INGEST", false);
        let work_mem_mb: u32 = env_parse("FAST_INGEST_WORK_MEM_MB", 64u32);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if fast_ingest {
                        // Best-effort; ignore errors to avoid blocking startup in restricted envs
                        let _ = sqlx::query("SET synchronous_commit = 'off'")
                            .execute(&mut *conn)
                            .await;
                        let _ = sqlx::query(&format!("SET work_mem = '{}MB'", work_mem_mb))
                            .execute(&mut *conn)
                            .await;
                    }
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Creates the categories/clues tables and their indexes when absent.
    pub async fn ensure_schema(&self) -> Result<()> {
        // raw_sql: multiple statements, no prepared statements under PgBouncer
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        info!("schema ensured");
        Ok(())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some(FK_VIOLATION) {
                return StoreError::Integrity(db.message().to_string());
            }
        }
        StoreError::Transient(e.to_string())
    }
}

#[derive(sqlx::FromRow)]
struct ClueJoinRow {
    id: i64,
    answer: String,
    question: String,
    value: Option<i32>,
    airdate: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    category_id: i64,
    game_id: i64,
    invalid_count: Option<i32>,
    category_title: Option<String>,
    category_created_at: Option<DateTime<Utc>>,
    category_updated_at: Option<DateTime<Utc>>,
    category_clues_count: Option<i32>,
}

impl From<ClueJoinRow> for ClueRecord {
    fn from(r: ClueJoinRow) -> Self {
        let category = match (
            r.category_title,
            r.category_created_at,
            r.category_updated_at,
        ) {
            (Some(title), Some(created_at), Some(updated_at)) => Some(Category {
                id: r.category_id,
                title,
                created_at,
                updated_at,
                clues_count: r.category_clues_count.unwrap_or(0),
            }),
            _ => None,
        };
        ClueRecord {
            clue: Clue {
                id: r.id,
                answer: r.answer,
                question: r.question,
                value: r.value,
                airdate: r.airdate,
                created_at: r.created_at,
                updated_at: r.updated_at,
                category_id: r.category_id,
                game_id: r.game_id,
                invalid_count: r.invalid_count,
                airdate_is_fallback: false,
            },
            category,
        }
    }
}

fn clue_select() -> QueryBuilder<'static, Postgres> {
    QueryBuilder::new(format!(
        "SELECT {CLUE_COLUMNS} FROM clues cl LEFT JOIN categories c ON c.id = cl.category_id WHERE 1 = 1"
    ))
}

#[async_trait]
impl ClueStore for Db {
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn upsert_categories(&self, rows: &[Category]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO categories (id, title, created_at, updated_at, clues_count) ",
        );
        qb.push_values(rows, |mut b, r| {
            b.push_bind(r.id)
                .push_bind(&r.title)
                .push_bind(r.created_at)
                .push_bind(r.updated_at)
                .push_bind(r.clues_count);
        });
        qb.push(
            " ON CONFLICT (id)
              DO UPDATE SET title = EXCLUDED.title,
                            clues_count = EXCLUDED.clues_count,
                            updated_at = EXCLUDED.updated_at
              WHERE categories.title IS DISTINCT FROM EXCLUDED.title
                 OR categories.clues_count IS DISTINCT FROM EXCLUDED.clues_count",
        );
        qb.build().persistent(false).execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn upsert_clues(&self, rows: &[Clue]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let (fallback, dated): (Vec<&Clue>, Vec<&Clue>) =
            rows.iter().partition(|r| r.airdate_is_fallback);
        let mut tx = self.pool.begin().await?;
        for (group, keep_airdate) in [(dated, false), (fallback, true)] {
            if group.is_empty() {
                continue;
            }
            clue_upsert(&group, keep_airdate)
                .build()
                .persistent(false)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn category(&self, id: i64) -> StoreResult<Option<Category>> {
        let row = sqlx::query_as::<_, Category>(
            "SELECT id, title, created_at, updated_at, clues_count FROM categories WHERE id = $1",
        )
        .persistent(false)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn clues_in_category(&self, id: i64, hide_at: i32) -> StoreResult<Vec<Clue>> {
        let rows = sqlx::query_as::<_, Clue>(
            "SELECT id, answer, question, value, airdate, created_at, updated_at, category_id, game_id, invalid_count
             FROM clues
             WHERE category_id = $1 AND COALESCE(invalid_count, 0) < $2
             ORDER BY id",
        )
        .persistent(false)
        .bind(id)
        .bind(hide_at)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_categories(&self, offset: i64, count: i64) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT id, title, created_at, updated_at, clues_count
             FROM categories ORDER BY id LIMIT $1 OFFSET $2",
        )
        .persistent(false)
        .bind(count)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn random_categories(&self, count: i64) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT id, title, created_at, updated_at, clues_count
             FROM categories ORDER BY random() LIMIT $1",
        )
        .persistent(false)
        .bind(count)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn random_clues(
        &self,
        count: i64,
        final_only: bool,
        hide_at: i32,
    ) -> StoreResult<Vec<ClueRecord>> {
        let mut qb = clue_select();
        qb.push(" AND COALESCE(cl.invalid_count, 0) < ").push_bind(hide_at);
        if final_only {
            qb.push(" AND cl.value IS NULL");
        }
        qb.push(" ORDER BY random() LIMIT ").push_bind(count);
        let rows: Vec<ClueJoinRow> = qb
            .build_query_as()
            .persistent(false)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ClueRecord::from).collect())
    }

    async fn list_clues(&self, filter: &ClueFilter) -> StoreResult<Vec<ClueRecord>> {
        let mut qb = clue_select();
        qb.push(" AND COALESCE(cl.invalid_count, 0) < ")
            .push_bind(filter.hide_at);
        if let Some(value) = filter.value {
            qb.push(" AND cl.value = ").push_bind(value);
        }
        if let Some(category_id) = filter.category_id {
            qb.push(" AND cl.category_id = ").push_bind(category_id);
        }
        if let Some(game_id) = filter.game_id {
            qb.push(" AND cl.game_id = ").push_bind(game_id);
        }
        if let Some(min_date) = filter.min_date {
            qb.push(" AND cl.airdate >= ").push_bind(min_date);
        }
        if let Some(max_date) = filter.max_date {
            qb.push(" AND cl.airdate <= ").push_bind(max_date);
        }
        qb.push(" ORDER BY cl.id LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
        let rows: Vec<ClueJoinRow> = qb
            .build_query_as()
            .persistent(false)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ClueRecord::from).collect())
    }

    async fn mark_invalid(&self, id: i64) -> StoreResult<Option<InvalidMark>> {
        let row: Option<(i64, i32)> = sqlx::query_as(
            "UPDATE clues SET invalid_count = COALESCE(invalid_count, 0) + 1
             WHERE id = $1 RETURNING id, invalid_count",
        )
        .persistent(false)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, invalid_count)| InvalidMark { id, invalid_count }))
    }

    async fn rename_category(&self, id: i64, title: &str) -> StoreResult<bool> {
        let done = sqlx::query("UPDATE categories SET title = $1, updated_at = now() WHERE id = $2")
            .persistent(false)
            .bind(title)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn category_titles(&self) -> StoreResult<Vec<(i64, String)>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, title FROM categories ORDER BY id")
                .persistent(false)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let (categories, clues): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM categories), (SELECT COUNT(*) FROM clues)",
        )
        .persistent(false)
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreStats { categories, clues })
    }
}

/// Upsert for one group of clues. With `keep_airdate` the stored airdate is
/// neither overwritten nor compared, since the incoming one is the run timestamp.
fn clue_upsert<'a>(rows: &[&'a Clue], keep_airdate: bool) -> QueryBuilder<'a, Postgres> {
    let mut qb: QueryBuilder<'a, Postgres> = QueryBuilder::new(
        "INSERT INTO clues (id, answer, question, value, airdate, created_at, updated_at, category_id, game_id, invalid_count) ",
    );
    qb.push_values(rows.iter().copied(), |mut b, r| {
        b.push_bind(r.id)
            .push_bind(&r.answer)
            .push_bind(&r.question)
            .push_bind(r.value)
            .push_bind(r.airdate)
            .push_bind(r.created_at)
            .push_bind(r.updated_at)
            .push_bind(r.category_id)
            .push_bind(r.game_id)
            .push_bind(r.invalid_count);
    });
    // created_at and invalid_count belong to the first import and to moderation
    qb.push(
        " ON CONFLICT (id)
          DO UPDATE SET answer = EXCLUDED.answer,
                        question = EXCLUDED.question,
                        value = EXCLUDED.value,
                        category_id = EXCLUDED.category_id,
                        game_id = EXCLUDED.game_id,
                        updated_at = EXCLUDED.updated_at",
    );
    if !keep_airdate {
        qb.push(", airdate = EXCLUDED.airdate");
    }
    qb.push(
        " WHERE clues.answer IS DISTINCT FROM EXCLUDED.answer
             OR clues.question IS DISTINCT FROM EXCLUDED.question
             OR clues.value IS DISTINCT FROM EXCLUDED.value
             OR clues.category_id IS DISTINCT FROM EXCLUDED.category_id
             OR clues.game_id IS DISTINCT FROM EXCLUDED.game_id",
    );
    if !keep_airdate {
        qb.push(" OR clues.airdate IS DISTINCT FROM EXCLUDED.airdate");
    }
    qb
}
