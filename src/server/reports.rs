use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};

use super::{parse_id, CurrentUser};
use crate::app::App;
use crate::error::Result;
use crate::models::Report;

/// Stream a new monthly report as server-sent events.
///
/// Quota and empty-month rejections happen before the stream opens and are
/// returned as ordinary JSON errors.
pub async fn create_report(
    State(app): State<Arc<App>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let events = app.reports.start(user_id).await?;

    let stream = events.filter_map(|event| async move {
        match Event::default().json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode report event");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn list_reports(
    State(app): State<Arc<App>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<Report>>> {
    Ok(Json(app.reports.list(user_id).await?))
}

pub async fn get_report(
    State(app): State<Arc<App>>,
    CurrentUser(user_id): CurrentUser,
    Path(report_id): Path<String>,
) -> Result<Json<Report>> {
    let report = app.reports.get(user_id, parse_id(&report_id)?).await?;
    Ok(Json(report))
}

pub async fn delete_report(
    State(app): State<Arc<App>>,
    CurrentUser(user_id): CurrentUser,
    Path(report_id): Path<String>,
) -> Result<StatusCode> {
    app.reports.delete(user_id, parse_id(&report_id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
