mod repository;
mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{NewPost, NewReport, Post, Report, SummaryStatus};

pub use repository::{format_datetime, Repository};

/// Post persistence used by the summary pipeline and report queries.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(&self, user_id: i64, post: NewPost, created_at: DateTime<Utc>) -> Result<Post>;

    async fn find_post(&self, id: i64) -> Result<Option<Post>>;

    /// Posts of `user_id` created within `[start, end]`, newest first.
    async fn find_posts_between(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Post>>;

    /// Stores the summary text and marks the post COMPLETED.
    async fn save_summary(&self, id: i64, summary: &str) -> Result<()>;

    async fn set_summary_status(&self, id: i64, status: SummaryStatus) -> Result<()>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn create_report(&self, report: NewReport) -> Result<Report>;

    async fn find_report(&self, id: i64) -> Result<Option<Report>>;

    /// Reports of `user_id`, newest first.
    async fn list_reports(&self, user_id: i64) -> Result<Vec<Report>>;

    async fn complete_report(&self, id: i64, content: &str) -> Result<()>;

    async fn fail_report(&self, id: i64, content: &str, error: &str) -> Result<()>;

    async fn delete_report(&self, id: i64) -> Result<()>;
}
