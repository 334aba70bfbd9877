// HTTP request handlers for API endpoints

use crate::api::error::ApiError;
use crate::api::models::*;
use crate::query::{ClueQuery, QueryService};
use actix_web::{web, HttpResponse};
use std::time::Instant;

/// Shared state handed to every handler.
pub struct AppState {
    pub query: QueryService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(query: QueryService) -> Self {
        Self {
            query,
            started_at: Instant::now(),
        }
    }
}

type HandlerResult = Result<HttpResponse, ApiError>;

pub async fn welcome() -> HttpResponse {
    HttpResponse::Ok().json(WelcomeResponse {
        message: "Welcome to jService API".to_string(),
    })
}

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let uptime_seconds = state.started_at.elapsed().as_secs();
    match state.query.stats().await {
        Ok(stats) => HttpResponse::Ok().json(ApiResponse::success(HealthResponse {
            status: "healthy".to_string(),
            store: "connected".to_string(),
            categories: stats.categories,
            clues: stats.clues,
            uptime_seconds,
        })),
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the store");
            HttpResponse::ServiceUnavailable().json(ApiResponse::success(HealthResponse {
                status: "degraded".to_string(),
                store: "disconnected".to_string(),
                categories: 0,
                clues: 0,
                uptime_seconds,
            }))
        }
    }
}

pub async fn random_clues(
    state: web::Data<AppState>,
    query: web::Query<CountQuery>,
) -> HandlerResult {
    let clues = state.query.random_clues(query.count).await?;
    Ok(HttpResponse::Ok().json(clues))
}

pub async fn final_clues(
    state: web::Data<AppState>,
    query: web::Query<CountQuery>,
) -> HandlerResult {
    let clues = state.query.final_clues(query.count).await?;
    Ok(HttpResponse::Ok().json(clues))
}

pub async fn list_clues(state: web::Data<AppState>, query: web::Query<ClueQuery>) -> HandlerResult {
    let clues = state.query.clues(&query).await?;
    Ok(HttpResponse::Ok().json(clues))
}

pub async fn list_categories(
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> HandlerResult {
    let categories = state.query.categories(query.count, query.offset).await?;
    Ok(HttpResponse::Ok().json(categories))
}

pub async fn random_categories(
    state: web::Data<AppState>,
    query: web::Query<CountQuery>,
) -> HandlerResult {
    let categories = state.query.random_categories(query.count).await?;
    Ok(HttpResponse::Ok().json(categories))
}

pub async fn category_by_path(state: web::Data<AppState>, path: web::Path<i64>) -> HandlerResult {
    let category = state.query.category(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(category))
}

pub async fn category_by_query(
    state: web::Data<AppState>,
    query: web::Query<CategoryIdQuery>,
) -> HandlerResult {
    let category = state.query.category(query.id).await?;
    Ok(HttpResponse::Ok().json(category))
}

pub async fn mark_invalid(
    state: web::Data<AppState>,
    payload: web::Json<InvalidRequest>,
) -> HandlerResult {
    let mark = state.query.mark_invalid(payload.id).await?;
    Ok(HttpResponse::Ok().json(mark))
}
