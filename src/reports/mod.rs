mod controller;
mod events;
mod period;

pub use controller::ReportStreamController;

use crate::db::ReportStore;
use crate::error::{AppError, Result};
use crate::models::Report;

/// Load a report that must belong to `user_id`.
pub async fn find_owned_report(
    store: &dyn ReportStore,
    user_id: i64,
    report_id: i64,
) -> Result<Report> {
    let report = store
        .find_report(report_id)
        .await?
        .ok_or(AppError::NotFound("report"))?;
    if report.user_id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok(report)
}
