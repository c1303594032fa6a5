use std::sync::Arc;

use anyhow::anyhow;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use super::events::ReportEvent;
use super::find_owned_report;
use super::period::month_bounds;
use crate::ai::{ReportGenerator, ReportStream};
use crate::clock::Clock;
use crate::db::{PostStore, ReportStore};
use crate::error::{AppError, Result};
use crate::models::{NewReport, PeriodType, Report, ReportStatus};
use crate::rate_limit::RateLimiter;

/// Message shown to the client when a stream ends in failure.
pub const REPORT_FAILED_MESSAGE: &str = "리포트 생성에 실패했습니다.";

const EVENT_BUFFER: usize = 32;

pub type ReportEventStream = ReceiverStream<ReportEvent>;

/// Runs one report request from quota check to persisted final state.
pub struct ReportStreamController {
    limiter: Arc<RateLimiter>,
    generator: Arc<ReportGenerator>,
    posts: Arc<dyn PostStore>,
    reports: Arc<dyn ReportStore>,
    clock: Arc<dyn Clock>,
}

impl ReportStreamController {
    pub fn new(
        limiter: Arc<RateLimiter>,
        generator: Arc<ReportGenerator>,
        posts: Arc<dyn PostStore>,
        reports: Arc<dyn ReportStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter,
            generator,
            posts,
            reports,
            clock,
        }
    }

    /// Start a monthly report for `user_id`.
    ///
    /// Errors returned here happen before any record is written. Once a
    /// stream is returned, generation runs on its own task and the report
    /// reaches COMPLETED or FAILED even if the client stops reading.
    pub async fn start(&self, user_id: i64) -> Result<ReportEventStream> {
        let decision = self.limiter.check(user_id).await;
        if !decision.allowed {
            info!(user_id, reset_at = %decision.reset_at, "report quota exceeded");
            return Err(AppError::QuotaExceeded {
                reset_at: decision.reset_at,
            });
        }

        let (start, end) = month_bounds(self.clock.now())
            .ok_or_else(|| AppError::Other(anyhow!("could not compute current month")))?;
        let posts = self.posts.find_posts_between(user_id, start, end).await?;
        if posts.is_empty() {
            return Err(AppError::NoPostsInPeriod);
        }

        let report = self
            .reports
            .create_report(NewReport {
                user_id,
                post_count: posts.len() as i64,
                period_type: PeriodType::Monthly,
                status: ReportStatus::Processing,
            })
            .await?;

        info!(
            user_id,
            report_id = report.id,
            post_count = report.post_count,
            remaining = decision.remaining,
            "report generation started"
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let chunks = self.generator.generate(posts);
        tokio::spawn(drive_report(
            report.id,
            chunks,
            Arc::clone(&self.reports),
            tx,
        ));

        Ok(ReceiverStream::new(rx))
    }

    pub async fn list(&self, user_id: i64) -> Result<Vec<Report>> {
        self.reports.list_reports(user_id).await
    }

    pub async fn get(&self, user_id: i64, report_id: i64) -> Result<Report> {
        find_owned_report(self.reports.as_ref(), user_id, report_id).await
    }

    pub async fn delete(&self, user_id: i64, report_id: i64) -> Result<()> {
        find_owned_report(self.reports.as_ref(), user_id, report_id).await?;
        self.reports.delete_report(report_id).await?;
        info!(user_id, report_id, "report deleted");
        Ok(())
    }
}

/// Forward generated chunks as events and persist the final state.
///
/// Send failures only mean the client went away; generation continues so
/// the stored report is still finished.
async fn drive_report(
    report_id: i64,
    mut chunks: ReportStream,
    reports: Arc<dyn ReportStore>,
    events: mpsc::Sender<ReportEvent>,
) -> ReportStatus {
    let _ = events.send(ReportEvent::Id { report_id }).await;

    let mut content = String::new();
    let mut failure: Option<AppError> = None;

    while let Some(item) = chunks.next().await {
        match item {
            Ok(chunk) => {
                content.push_str(&chunk);
                let _ = events.send(ReportEvent::Chunk { content: chunk }).await;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    if failure.is_none() {
        match reports.complete_report(report_id, &content).await {
            Ok(()) => {
                info!(report_id, length = content.chars().count(), "report completed");
                let _ = events.send(ReportEvent::Done { content }).await;
                return ReportStatus::Completed;
            }
            Err(e) => failure = Some(e),
        }
    }

    if let Some(e) = failure {
        error!(report_id, error = %e, class = e.class(), "report generation failed");
        if let Err(store_err) = reports.fail_report(report_id, &content, &e.to_string()).await {
            warn!(report_id, error = %store_err, "failed to mark report FAILED");
        }
    }
    let _ = events
        .send(ReportEvent::Error {
            error: REPORT_FAILED_MESSAGE.to_string(),
        })
        .await;
    ReportStatus::Failed
}
