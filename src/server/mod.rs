mod health;
mod identity;
mod posts;
mod reports;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::App;
use crate::error::{AppError, Result};

pub use identity::CurrentUser;

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/posts", post(posts::create_post))
        .route("/api/posts/:post_id", get(posts::get_post))
        .route("/api/reports", post(reports::create_report).get(reports::list_reports))
        .route(
            "/api/reports/:report_id",
            get(reports::get_report).delete(reports::delete_report),
        )
        .route("/api/queue/depth", get(health::queue_depth))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

/// Serve until `shutdown` fires, then let in-flight requests finish.
pub async fn serve(app: Arc<App>, shutdown: CancellationToken) -> Result<()> {
    let addr = app.config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router(app))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Route ids are numeric; anything else is a client error.
fn parse_id(raw: &str) -> Result<i64> {
    raw.parse::<i64>()
        .map_err(|_| AppError::Validation(format!("잘못된 ID입니다: {}", raw)))
}
