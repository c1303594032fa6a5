use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::{AppError, Result};

/// Incremental text deltas from a streaming generation call.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A remote text generation model.
///
/// Implementations do not impose their own deadline; callers wrap calls in
/// `tokio::time::timeout` and drop the future when it elapses.
#[async_trait]
pub trait GenerativeTextService: Send + Sync {
    /// Complete `prompt` and return the whole text.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String>;

    /// Start a streaming completion.
    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<TextStream>;
}

/// Stand-in used when no API key is configured. Every call fails, which
/// sends summaries and reports down their fallback paths.
pub struct UnconfiguredTextService;

#[async_trait]
impl GenerativeTextService for UnconfiguredTextService {
    async fn generate(&self, _model: &str, _prompt: &str) -> Result<String> {
        Err(AppError::Config("GEMINI_API_KEY is not set".to_string()))
    }

    async fn generate_stream(&self, _model: &str, _prompt: &str) -> Result<TextStream> {
        Err(AppError::Config("GEMINI_API_KEY is not set".to_string()))
    }
}
