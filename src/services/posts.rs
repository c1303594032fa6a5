use std::sync::Arc;

use tracing::{error, info};

use crate::clock::Clock;
use crate::db::PostStore;
use crate::error::{AppError, Result};
use crate::models::{NewPost, Post, SummarizationJob, SummaryStatus};
use crate::queue::JobQueue;

const MAX_TITLE_CHARS: usize = 200;

/// Post creation and lookup, including handing new posts to the summary queue.
pub struct PostService {
    posts: Arc<dyn PostStore>,
    queue: Arc<JobQueue>,
    clock: Arc<dyn Clock>,
}

impl PostService {
    pub fn new(posts: Arc<dyn PostStore>, queue: Arc<JobQueue>, clock: Arc<dyn Clock>) -> Self {
        Self { posts, queue, clock }
    }

    /// Store a post as PENDING and queue its summary.
    ///
    /// The post is returned even when the queue stays unavailable; in that
    /// case it is marked FAILED so it does not wait forever.
    pub async fn create_post(&self, user_id: i64, input: NewPost) -> Result<Post> {
        let input = input.normalized();
        validate(&input)?;

        let mut post = self.posts.create_post(user_id, input, self.clock.now()).await?;
        info!(user_id, post_id = post.id, tags = post.tags.len(), "post created");

        match self.queue.enqueue_with_retry(&SummarizationJob::new(post.id)).await {
            Ok(()) => {}
            Err(e @ AppError::QueueUnavailable { .. }) => {
                error!(post_id = post.id, error = %e, "summary job not queued, marking post FAILED");
                self.posts
                    .set_summary_status(post.id, SummaryStatus::Failed)
                    .await?;
                post.summary_status = SummaryStatus::Failed;
            }
            Err(e) => return Err(e),
        }

        Ok(post)
    }

    pub async fn get_post(&self, user_id: i64, post_id: i64) -> Result<Post> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or(AppError::NotFound("post"))?;
        if post.user_id != user_id {
            return Err(AppError::Forbidden);
        }
        Ok(post)
    }
}

fn validate(input: &NewPost) -> Result<()> {
    if input.title.is_empty() {
        return Err(AppError::Validation("제목을 입력해주세요.".to_string()));
    }
    if input.title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::Validation(format!(
            "제목은 {}자 이하로 입력해주세요.",
            MAX_TITLE_CHARS
        )));
    }
    if input.content.trim().is_empty() {
        return Err(AppError::Validation("내용을 입력해주세요.".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tokio_test::{assert_err, assert_ok};

    use crate::clock::testing::ManualClock;
    use crate::db::Repository;
    use crate::queue::testing::FlakyQueue;
    use crate::queue::{MemoryQueue, QueueBackend, RetryPolicy};

    async fn service(backend: Arc<dyn QueueBackend>) -> (PostService, Arc<JobQueue>) {
        let repo = Arc::new(Repository::in_memory().await.unwrap());
        let queue = Arc::new(JobQueue::new(
            backend,
            "summary-queue".to_string(),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1000),
            },
        ));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap(),
        ));
        (PostService::new(repo, queue.clone(), clock), queue)
    }

    fn new_post(title: &str, content: &str) -> NewPost {
        NewPost {
            title: title.to_string(),
            content: content.to_string(),
            tags: vec!["rust".to_string(), " rust ".to_string(), "tokio".to_string()],
        }
    }

    #[tokio::test]
    async fn create_queues_summary_job() {
        let (service, queue) = service(Arc::new(MemoryQueue::new())).await;

        let post = assert_ok!(service.create_post(7, new_post("  Pinning  ", "Pin<&mut T>")).await);

        assert_eq!(post.title, "Pinning");
        assert_eq!(post.tags, vec!["rust", "tokio"]);
        assert_eq!(post.summary_status, SummaryStatus::Pending);
        assert_eq!(post.created_at, Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap());
        assert_eq!(queue.queue_depth("summary-queue").await, 1);

        let message = &queue.receive(1, Duration::from_secs(60)).await.unwrap()[0];
        assert_eq!(SummarizationJob::decode(&message.body).unwrap().post_id, post.id);
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let (service, queue) = service(Arc::new(MemoryQueue::new())).await;

        let err = assert_err!(service.create_post(1, new_post("   ", "body")).await);
        assert!(matches!(err, AppError::Validation(_)));
        let err = assert_err!(service.create_post(1, new_post("title", " \n ")).await);
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(queue.queue_depth("summary-queue").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_queue_marks_post_failed() {
        let (service, _queue) = service(Arc::new(FlakyQueue::failing_sends(10))).await;

        let post = assert_ok!(service.create_post(1, new_post("title", "body")).await);

        assert_eq!(post.summary_status, SummaryStatus::Failed);
        let stored = service.get_post(1, post.id).await.unwrap();
        assert_eq!(stored.summary_status, SummaryStatus::Failed);
    }

    #[tokio::test]
    async fn get_post_checks_owner() {
        let (service, _queue) = service(Arc::new(MemoryQueue::new())).await;
        let post = service.create_post(1, new_post("title", "body")).await.unwrap();

        assert_eq!(service.get_post(1, post.id).await.unwrap().id, post.id);
        assert!(matches!(service.get_post(2, post.id).await, Err(AppError::Forbidden)));
        assert!(matches!(service.get_post(1, 999).await, Err(AppError::NotFound(_))));
    }
}
