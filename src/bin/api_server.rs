// HTTP API server binary for jService
// Serves clues from Postgres, or from a JSON snapshot with STORE_BACKEND=memory

use anyhow::{bail, Context, Result};
use jservice::api::ApiServer;
use jservice::database_ops::store::ClueStore;
use jservice::database_ops::{Db, MemoryStore};
use jservice::util::env as env_util;
use std::path::PathBuf;
use std::sync::Arc;

async fn open_store() -> Result<Arc<dyn ClueStore>> {
    let backend = env_util::env_opt("STORE_BACKEND").unwrap_or_else(|| "postgres".to_string());
    match backend.trim().to_ascii_lowercase().as_str() {
        "postgres" => {
            let database_url = env_util::db_url()?;
            let max_connections: u32 = env_util::env_parse("DB_MAX_CONNS", 10u32);
            let db = Db::connect(&database_url, max_connections).await?;
            tracing::info!("Database connected successfully");
            Ok(Arc::new(db))
        }
        "memory" => {
            let path = PathBuf::from(
                env_util::env_opt("SNAPSHOT_PATH").unwrap_or_else(|| "jservice_data.json".into()),
            );
            let store = MemoryStore::load(&path)
                .with_context(|| format!("load snapshot {}", path.display()))?;
            tracing::info!(path = %path.display(), "Serving JSON snapshot from memory");
            Ok(Arc::new(store))
        }
        other => bail!("unknown STORE_BACKEND {other:?}; expected postgres or memory"),
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    // Load dotenv/env once (safe to call multiple times)
    env_util::init_env();
    jservice::tracing::init_tracing(jservice::tracing::DEFAULT_FILTER)?;

    tracing::info!("Initializing jService API server");

    env_util::preflight_check(
        "api_server",
        &[],
        &[
            "STORE_BACKEND",
            "DATABASE_URL",
            "SNAPSHOT_PATH",
            "API_HOST",
            "API_PORT",
            "ALLOWED_ORIGINS",
            "INVALID_HIDE_THRESHOLD",
        ],
    )?;

    let server = ApiServer::from_env()?;
    let store = open_store().await?;

    match store.stats().await {
        Ok(stats) if stats.clues == 0 => tracing::warn!("store holds no clues yet; run an import first"),
        Ok(stats) => tracing::info!(categories = stats.categories, clues = stats.clues, "store ready"),
        Err(e) => tracing::warn!(error = %e, "could not read store stats"),
    }

    server.run(store).await?;

    Ok(())
}
