use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ai::{GeminiClient, GenerativeTextService, ReportGenerator, Summarizer, UnconfiguredTextService};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, QueueBackendKind};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::queue::{JobQueue, MemoryQueue, QueueBackend, RetryPolicy, SqliteQueue};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::reports::ReportStreamController;
use crate::services::PostService;
use crate::worker::SummaryWorker;

const CHECK_PROMPT: &str = "Hello";

/// Every long-lived component, wired once at startup and shared by the HTTP
/// handlers and background tasks.
pub struct App {
    pub config: Config,
    pub repository: Arc<Repository>,
    pub text_service: Arc<dyn GenerativeTextService>,
    pub queue: Arc<JobQueue>,
    pub limiter: Arc<RateLimiter>,
    pub worker: Arc<SummaryWorker>,
    pub posts: PostService,
    pub reports: ReportStreamController,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Arc::new(Repository::new(&config.db_path).await?);

        let text_service: Arc<dyn GenerativeTextService> = match &config.gemini_api_key {
            Some(key) => Arc::new(GeminiClient::new(key.clone())?),
            None => {
                warn!("GEMINI_API_KEY not set, summaries and reports will use offline fallbacks");
                Arc::new(UnconfiguredTextService)
            }
        };

        let backend: Arc<dyn QueueBackend> = match config.queue.backend {
            QueueBackendKind::Sqlite => Arc::new(SqliteQueue::new(repository.connection())),
            QueueBackendKind::Memory => Arc::new(MemoryQueue::new()),
        };

        Ok(Self::from_parts(
            config.clone(),
            repository,
            text_service,
            backend,
            Arc::new(SystemClock),
        ))
    }

    pub fn from_parts(
        config: Config,
        repository: Arc<Repository>,
        text_service: Arc<dyn GenerativeTextService>,
        backend: Arc<dyn QueueBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let generation = &config.generation;

        let queue = Arc::new(JobQueue::new(
            backend,
            config.queue.name.clone(),
            RetryPolicy::from(&config.queue),
        ));
        let limiter = Arc::new(RateLimiter::new(
            RateLimitConfig::from(&config.rate_limit),
            Arc::clone(&clock),
        ));
        let summarizer = Arc::new(Summarizer::new(
            Arc::clone(&text_service),
            generation.summary_model.clone(),
            Duration::from_secs(generation.summary_timeout_secs),
        ));
        let generator = Arc::new(ReportGenerator::new(
            Arc::clone(&text_service),
            generation.report_model.clone(),
            Duration::from_secs(generation.report_timeout_secs),
        ));

        let worker = Arc::new(SummaryWorker::new(
            Arc::clone(&queue),
            summarizer,
            repository.clone(),
            config.worker.clone(),
        ));
        let posts = PostService::new(repository.clone(), Arc::clone(&queue), Arc::clone(&clock));
        let reports = ReportStreamController::new(
            Arc::clone(&limiter),
            generator,
            repository.clone(),
            repository.clone(),
            clock,
        );

        Self {
            config,
            repository,
            text_service,
            queue,
            limiter,
            worker,
            posts,
            reports,
        }
    }

    /// Start the summary worker and the rate-limit sweeper.
    pub fn spawn_background(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let worker = Arc::clone(&self.worker);
        let token = shutdown.clone();
        vec![
            tokio::spawn(async move { worker.run(token).await }),
            self.limiter.spawn_sweeper(shutdown.clone()),
        ]
    }

    /// One short generation against the configured model.
    pub async fn check_ai(&self) -> Result<String> {
        let generation = &self.config.generation;
        let text = tokio::time::timeout(
            Duration::from_secs(generation.summary_timeout_secs),
            self.text_service.generate(&generation.summary_model, CHECK_PROMPT),
        )
        .await
        .map_err(|_| AppError::GenerationTimeout)??;

        if text.trim().is_empty() {
            return Err(AppError::GenerationEmpty);
        }
        info!(model = %generation.summary_model, "generative service reachable");
        Ok(text)
    }

    pub async fn queue_depth(&self) -> u64 {
        self.queue.queue_depth(self.queue.name()).await
    }
}
