use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ai::Summarizer;
use crate::config::WorkerSettings;
use crate::db::PostStore;
use crate::error::Result;
use crate::models::{SummarizationJob, SummarySource, SummaryStatus};
use crate::queue::{JobQueue, QueueMessage};

/// What happened to one delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Summarized(SummarySource),
    AlreadyCompleted,
    PostMissing,
    /// Payload could not be decoded.
    Poisoned,
    /// Delivered too many times; the post was marked FAILED.
    GaveUp,
}

/// Consumes summarization jobs and stores the results on the post.
pub struct SummaryWorker {
    queue: Arc<JobQueue>,
    summarizer: Arc<Summarizer>,
    posts: Arc<dyn PostStore>,
    settings: WorkerSettings,
}

impl SummaryWorker {
    pub fn new(
        queue: Arc<JobQueue>,
        summarizer: Arc<Summarizer>,
        posts: Arc<dyn PostStore>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            summarizer,
            posts,
            settings,
        }
    }

    /// Poll until `shutdown` fires. Individual job failures never end the loop.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            queue = self.queue.name(),
            concurrency = self.settings.concurrency,
            "summary worker started"
        );

        loop {
            let handled = tokio::select! {
                _ = shutdown.cancelled() => break,
                handled = self.poll_once() => handled,
            };

            if handled == 0 {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.poll_interval()) => {}
                }
            }
        }

        info!("summary worker stopped");
    }

    /// Receive one batch and process it with bounded concurrency.
    /// Returns the number of messages received.
    pub async fn poll_once(&self) -> usize {
        let messages = match self
            .queue
            .receive(self.settings.concurrency, self.settings.visibility_timeout())
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, class = e.class(), "failed to receive summary jobs");
                return 0;
            }
        };

        let count = messages.len();
        stream::iter(messages)
            .map(|message| self.handle_message(message))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;
        count
    }

    async fn handle_message(&self, message: QueueMessage) {
        match self.process(&message).await {
            Ok(outcome) => {
                debug!(message_id = message.id, ?outcome, "summary job handled");
                if let Err(e) = self.queue.ack(&message).await {
                    // Redelivery is harmless; the next run sees the post COMPLETED.
                    warn!(message_id = message.id, error = %e, "failed to delete summary job");
                }
            }
            Err(e) => {
                let post_id = SummarizationJob::decode(&message.body).ok().map(|job| job.post_id);
                error!(
                    message_id = message.id,
                    post_id,
                    dequeue_count = message.dequeue_count,
                    error = %e,
                    class = e.class(),
                    "summary job failed, leaving it for redelivery"
                );
            }
        }
    }

    /// Handle one delivery. `Err` means the message should be redelivered.
    pub async fn process(&self, message: &QueueMessage) -> Result<JobOutcome> {
        let job = match SummarizationJob::decode(&message.body) {
            Ok(job) => job,
            Err(e) => {
                error!(message_id = message.id, error = %e, "discarding undecodable summary job");
                return Ok(JobOutcome::Poisoned);
            }
        };
        let post_id = job.post_id;

        let Some(post) = self.posts.find_post(post_id).await? else {
            error!(post_id, "post not found for summary job");
            return Ok(JobOutcome::PostMissing);
        };

        if post.summary_status == SummaryStatus::Completed {
            info!(post_id, "summary already completed");
            return Ok(JobOutcome::AlreadyCompleted);
        }

        // COMPLETED is final, so the delivery limit only applies to unfinished posts.
        if message.dequeue_count > self.settings.max_deliveries {
            error!(
                post_id,
                dequeue_count = message.dequeue_count,
                "summary job exceeded delivery limit"
            );
            self.posts
                .set_summary_status(post_id, SummaryStatus::Failed)
                .await?;
            return Ok(JobOutcome::GaveUp);
        }

        let started = tokio::time::Instant::now();
        let summary = self
            .summarizer
            .generate_summary(post_id, &post.title, &post.content)
            .await;
        self.posts.save_summary(post_id, &summary.content).await?;

        info!(
            post_id,
            source = ?summary.source,
            model = self.summarizer.model_version(),
            duration_ms = started.elapsed().as_millis() as u64,
            "summary completed"
        );
        Ok(JobOutcome::Summarized(summary.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;

    use crate::ai::testing::{Script, ScriptedTextService};
    use crate::db::Repository;
    use crate::models::NewPost;
    use crate::queue::testing::FlakyQueue;
    use crate::queue::{MemoryQueue, QueueBackend, RetryPolicy};

    struct Harness {
        worker: SummaryWorker,
        queue: Arc<JobQueue>,
        repo: Arc<Repository>,
        service: Arc<ScriptedTextService>,
    }

    async fn harness_with(backend: Arc<dyn QueueBackend>, script: Script) -> Harness {
        let repo = Arc::new(Repository::in_memory().await.unwrap());
        let queue = Arc::new(JobQueue::new(
            backend,
            "summary-queue".to_string(),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
            },
        ));
        let service = Arc::new(ScriptedTextService::new(script));
        let summarizer = Arc::new(Summarizer::new(
            service.clone(),
            "gemini-2.5-flash".to_string(),
            Duration::from_secs(15),
        ));
        let settings = WorkerSettings {
            concurrency: 2,
            poll_interval_ms: 10,
            visibility_timeout_secs: 0,
            max_deliveries: 3,
        };
        let worker = SummaryWorker::new(queue.clone(), summarizer, repo.clone(), settings);
        Harness {
            worker,
            queue,
            repo,
            service,
        }
    }

    async fn harness(script: Script) -> Harness {
        harness_with(Arc::new(MemoryQueue::new()), script).await
    }

    async fn create_post(repo: &Repository, content: &str) -> i64 {
        repo.create_post(
            1,
            NewPost {
                title: "Async Rust".to_string(),
                content: content.to_string(),
                tags: vec!["rust".to_string()],
            },
            Utc::now(),
        )
        .await
        .unwrap()
        .id
    }

    fn message(id: i64, body: &str, dequeue_count: u32) -> QueueMessage {
        QueueMessage {
            id,
            body: body.to_string(),
            dequeue_count,
        }
    }

    #[tokio::test]
    async fn summarizes_and_acknowledges() {
        let h = harness(Script::Text("Futures are lazy.".into())).await;
        let post_id = create_post(&h.repo, "content").await;
        h.queue
            .enqueue_with_retry(&SummarizationJob::new(post_id))
            .await
            .unwrap();

        assert_eq!(h.worker.poll_once().await, 1);

        let post = h.repo.find_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.summary.as_deref(), Some("Futures are lazy."));
        assert_eq!(post.summary_status, SummaryStatus::Completed);
        assert_eq!(h.queue.queue_depth("summary-queue").await, 0);
    }

    #[tokio::test]
    async fn service_failure_still_completes_with_truncation() {
        let h = harness(Script::Fail("quota".into())).await;
        let content = "가".repeat(300);
        let post_id = create_post(&h.repo, &content).await;

        let outcome = h
            .worker
            .process(&message(1, &SummarizationJob::new(post_id).encode().unwrap(), 1))
            .await
            .unwrap();

        assert_eq!(outcome, JobOutcome::Summarized(SummarySource::Truncation));
        let post = h.repo.find_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.summary_status, SummaryStatus::Completed);
        assert_eq!(post.summary.unwrap(), "가".repeat(200));
    }

    #[tokio::test]
    async fn duplicate_delivery_is_idempotent() {
        let h = harness(Script::Text("Same summary.".into())).await;
        let post_id = create_post(&h.repo, "content").await;
        let body = SummarizationJob::new(post_id).encode().unwrap();

        let first = h.worker.process(&message(1, &body, 1)).await.unwrap();
        let after_first = h.repo.find_post(post_id).await.unwrap().unwrap().summary;
        let second = h.worker.process(&message(2, &body, 1)).await.unwrap();
        let after_second = h.repo.find_post(post_id).await.unwrap().unwrap().summary;

        assert_eq!(first, JobOutcome::Summarized(SummarySource::Model));
        assert_eq!(second, JobOutcome::AlreadyCompleted);
        assert_eq!(after_first, after_second);
        assert_eq!(h.service.calls(), 1);
    }

    #[tokio::test]
    async fn undecodable_and_missing_jobs_are_discarded() {
        let h = harness(Script::Text("unused".into())).await;

        assert_eq!(
            h.worker.process(&message(1, "%%%", 1)).await.unwrap(),
            JobOutcome::Poisoned
        );
        let missing = SummarizationJob::new(999).encode().unwrap();
        assert_eq!(
            h.worker.process(&message(2, &missing, 1)).await.unwrap(),
            JobOutcome::PostMissing
        );
        assert_eq!(h.service.calls(), 0);
    }

    #[tokio::test]
    async fn too_many_deliveries_marks_post_failed() {
        let h = harness(Script::Text("unused".into())).await;
        let post_id = create_post(&h.repo, "content").await;
        let body = SummarizationJob::new(post_id).encode().unwrap();

        let outcome = h.worker.process(&message(1, &body, 4)).await.unwrap();

        assert_eq!(outcome, JobOutcome::GaveUp);
        let post = h.repo.find_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.summary_status, SummaryStatus::Failed);
    }

    #[tokio::test]
    async fn delivery_limit_never_demotes_completed_post() {
        let h = harness(Script::Text("Done summary.".into())).await;
        let post_id = create_post(&h.repo, "content").await;
        let body = SummarizationJob::new(post_id).encode().unwrap();
        h.worker.process(&message(1, &body, 1)).await.unwrap();

        let outcome = h.worker.process(&message(1, &body, 4)).await.unwrap();

        assert_eq!(outcome, JobOutcome::AlreadyCompleted);
        let post = h.repo.find_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.summary_status, SummaryStatus::Completed);
        assert_eq!(post.summary.as_deref(), Some("Done summary."));
    }

    /// Repository whose summary writes always fail.
    struct ReadOnlyPosts(Arc<Repository>);

    #[async_trait::async_trait]
    impl PostStore for ReadOnlyPosts {
        async fn create_post(
            &self,
            user_id: i64,
            post: NewPost,
            created_at: chrono::DateTime<Utc>,
        ) -> Result<crate::models::Post> {
            self.0.create_post(user_id, post, created_at).await
        }

        async fn find_post(&self, id: i64) -> Result<Option<crate::models::Post>> {
            self.0.find_post(id).await
        }

        async fn find_posts_between(
            &self,
            user_id: i64,
            start: chrono::DateTime<Utc>,
            end: chrono::DateTime<Utc>,
        ) -> Result<Vec<crate::models::Post>> {
            self.0.find_posts_between(user_id, start, end).await
        }

        async fn save_summary(&self, _id: i64, _summary: &str) -> Result<()> {
            Err(crate::error::AppError::Config("database is read-only".into()))
        }

        async fn set_summary_status(&self, id: i64, status: SummaryStatus) -> Result<()> {
            self.0.set_summary_status(id, status).await
        }
    }

    #[tokio::test]
    async fn store_failure_keeps_message_and_logs_post_id() {
        let h = harness(Script::Text("summary".into())).await;
        let post_id = create_post(&h.repo, "content").await;
        h.queue
            .enqueue_with_retry(&SummarizationJob::new(post_id))
            .await
            .unwrap();
        let summarizer = Arc::new(Summarizer::new(
            h.service.clone(),
            "gemini-2.5-flash".to_string(),
            Duration::from_secs(15),
        ));
        let worker = SummaryWorker::new(
            h.queue.clone(),
            summarizer,
            Arc::new(ReadOnlyPosts(h.repo.clone())),
            WorkerSettings {
                visibility_timeout_secs: 60,
                ..WorkerSettings::default()
            },
        );

        let (logs, _guard) = crate::log_capture::capture();
        assert_eq!(worker.poll_once().await, 1);

        let output = logs.contents();
        assert!(output.contains("summary job failed"), "{}", output);
        assert!(output.contains(&format!("post_id={}", post_id)), "{}", output);
        assert_eq!(h.queue.queue_depth("summary-queue").await, 1);
        let post = h.repo.find_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.summary_status, SummaryStatus::Pending);
    }

    #[tokio::test]
    async fn retried_enqueue_reaches_worker_once() {
        let backend = Arc::new(FlakyQueue::failing_sends(2));
        let h = harness_with(backend.clone(), Script::Text("done".into())).await;
        let post_id = create_post(&h.repo, "content").await;

        h.queue
            .enqueue_with_retry(&SummarizationJob::new(post_id))
            .await
            .unwrap();

        assert_eq!(backend.send_attempts(), 3);
        assert_eq!(h.worker.poll_once().await, 1);
        assert_eq!(h.worker.poll_once().await, 0);
        assert_eq!(h.service.calls(), 1);
    }

    #[tokio::test]
    async fn run_drains_queue_until_cancelled() {
        let h = harness(Script::Text("ok".into())).await;
        let mut ids = Vec::new();
        for _ in 0..5 {
            let id = create_post(&h.repo, "content").await;
            h.queue
                .enqueue_with_retry(&SummarizationJob::new(id))
                .await
                .unwrap();
            ids.push(id);
        }

        let shutdown = CancellationToken::new();
        let worker = Arc::new(h.worker);
        let handle = {
            let worker = Arc::clone(&worker);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await })
        };

        for _ in 0..100 {
            if h.queue.queue_depth("summary-queue").await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        handle.await.unwrap();

        for id in ids {
            let post = h.repo.find_post(id).await.unwrap().unwrap();
            assert_eq!(post.summary_status, SummaryStatus::Completed);
        }
    }
}
