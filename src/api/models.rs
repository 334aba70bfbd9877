// API request/response models (DTOs)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope for error responses and operational endpoints.
/// Trivia payloads are returned bare so existing jService clients keep working.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta::now()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: Some(Meta::now()),
        }
    }
}

/// Metadata included in all enveloped responses
#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WelcomeResponse {
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub categories: i64,
    pub clues: i64,
    pub uptime_seconds: u64,
}

/// `?count=` for the random endpoints
#[derive(Debug, Default, Deserialize)]
pub struct CountQuery {
    pub count: Option<i64>,
}

/// `?count=&offset=` for the category listing
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub count: Option<i64>,
    pub offset: Option<i64>,
}

/// `?id=` form of the category lookup
#[derive(Debug, Deserialize)]
pub struct CategoryIdQuery {
    pub id: i64,
}

/// Body of `POST /api/invalid`
#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidRequest {
    pub id: i64,
}
