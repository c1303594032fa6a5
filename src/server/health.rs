use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app::App;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

#[derive(Serialize)]
pub struct QueueDepthResponse {
    queue: String,
    depth: u64,
}

/// 200 when the database answers, 503 otherwise. Failure details go to the
/// log only.
pub async fn health(State(app): State<Arc<App>>) -> (StatusCode, Json<HealthResponse>) {
    match app.repository.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database: "ok",
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    database: "error",
                }),
            )
        }
    }
}

pub async fn queue_depth(State(app): State<Arc<App>>) -> Json<QueueDepthResponse> {
    Json(QueueDepthResponse {
        queue: app.queue.name().to_string(),
        depth: app.queue_depth().await,
    })
}
