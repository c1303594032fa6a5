use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Generation API error: {0}")]
    GenerationApi(String),

    #[error("Generation timed out")]
    GenerationTimeout,

    #[error("Generation returned no text")]
    GenerationEmpty,

    #[error("Queue transport error: {0}")]
    QueueTransport(String),

    #[error("Queue unavailable after {attempts} attempts: {last_error}")]
    QueueUnavailable { attempts: u32, last_error: String },

    #[error("Rate limit exceeded until {reset_at}")]
    QuotaExceeded { reset_at: DateTime<Utc> },

    #[error("No posts in the requested period")]
    NoPostsInPeriod,

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Short name used in logs, never shown to end users.
    pub fn class(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Sqlite(_) => "database",
            AppError::Http(e) if e.is_timeout() => "timeout",
            AppError::Http(_) => "http",
            AppError::Json(_) => "json",
            AppError::Io(_) => "io",
            AppError::TomlParse(_) | AppError::Config(_) => "config",
            AppError::GenerationApi(_) => "generation_api",
            AppError::GenerationTimeout => "timeout",
            AppError::GenerationEmpty => "empty_response",
            AppError::QueueTransport(_) => "queue_transport",
            AppError::QueueUnavailable { .. } => "queue_unavailable",
            AppError::QuotaExceeded { .. } => "quota_exceeded",
            AppError::NoPostsInPeriod => "no_posts",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Other(_) => "other",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::QuotaExceeded { reset_at } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": "요청 한도를 초과했습니다.",
                    "resetTime": reset_at.to_rfc3339(),
                }),
            ),
            AppError::NoPostsInPeriod => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "이번 달에 작성된 포스트가 없습니다." }),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "로그인이 필요합니다." }),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                json!({ "error": "접근 권한이 없습니다." }),
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("{} not found", what) }),
            ),
            _ => {
                tracing::error!(error = %self, class = self.class(), "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "서버 오류가 발생했습니다." }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
