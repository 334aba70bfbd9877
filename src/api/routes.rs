// API route configuration

use crate::api::error::ApiError;
use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::JsonConfig::default()
            .limit(4096)
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .route("/", web::get().to(handlers::welcome))
    .route("/health", web::get().to(handlers::health_check))
    .service(
        web::scope("/api")
            .route("/random", web::get().to(handlers::random_clues))
            .route("/final", web::get().to(handlers::final_clues))
            .route("/clues", web::get().to(handlers::list_clues))
            .route("/categories", web::get().to(handlers::list_categories))
            .route(
                "/random_category",
                web::get().to(handlers::random_categories),
            )
            .route("/category", web::get().to(handlers::category_by_query))
            .route("/category/{id}", web::get().to(handlers::category_by_path))
            .route("/invalid", web::post().to(handlers::mark_invalid)),
    );
}
