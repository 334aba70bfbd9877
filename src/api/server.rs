// API server implementation using actix-web

use crate::api::handlers::AppState;
use crate::api::{middleware, routes};
use crate::database_ops::store::ClueStore;
use crate::query::{QueryService, DEFAULT_HIDE_THRESHOLD};
use crate::util::env::{env_opt, env_parse};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub allowed_origins: String,
    /// Clues with `invalid_count` at or above this are hidden from reads.
    pub hide_threshold: i32,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        crate::util::env::init_env();

        let host = env_opt("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = env_opt("API_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .trim()
            .parse()
            .context("Invalid API_PORT")?;
        let allowed_origins = env_opt("ALLOWED_ORIGINS").unwrap_or_else(|| "*".to_string());
        let hide_threshold = env_parse("INVALID_HIDE_THRESHOLD", DEFAULT_HIDE_THRESHOLD).max(1);

        Ok(Self {
            host,
            port,
            allowed_origins,
            hide_threshold,
        })
    }

    /// Start the HTTP server
    pub async fn run(self, store: Arc<dyn ClueStore>) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            hide_threshold = self.hide_threshold,
            "Starting jService API server"
        );

        let state = web::Data::new(AppState::new(QueryService::new(
            store,
            self.hide_threshold,
        )));
        let allowed_origins = self.allowed_origins.clone();

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);

            App::new()
                .app_data(state.clone())
                .wrap(logger)
                .wrap(compress)
                .wrap(cors)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}
