use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::AppError;
use crate::models::{GeneratedSummary, SummarySource};

use super::service::GenerativeTextService;

/// Characters kept when the model cannot produce a summary.
pub const FALLBACK_SUMMARY_CHARS: usize = 200;

/// Post content beyond this many characters is not sent to the model.
const MAX_PROMPT_CONTENT_CHARS: usize = 10_000;

pub struct Summarizer {
    service: Arc<dyn GenerativeTextService>,
    model: String,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(service: Arc<dyn GenerativeTextService>, model: String, timeout: Duration) -> Self {
        Self {
            service,
            model,
            timeout,
        }
    }

    /// Summarize a learning post in two or three sentences.
    ///
    /// Never fails: a timeout, an empty answer or a service error all yield
    /// the first characters of `content` instead.
    pub async fn generate_summary(
        &self,
        post_id: i64,
        post_title: &str,
        post_content: &str,
    ) -> GeneratedSummary {
        let prompt = build_summary_prompt(post_title, post_content);

        let result = match tokio::time::timeout(
            self.timeout,
            self.service.generate(&self.model, &prompt),
        )
        .await
        {
            Ok(Ok(text)) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            Ok(Ok(_)) => Err(AppError::GenerationEmpty),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AppError::GenerationTimeout),
        };

        match result {
            Ok(content) => GeneratedSummary {
                content,
                source: SummarySource::Model,
            },
            Err(e) => {
                warn!(
                    post_id,
                    error = %e,
                    class = e.class(),
                    "summary generation failed, truncating content"
                );
                GeneratedSummary {
                    content: truncate_chars(post_content, FALLBACK_SUMMARY_CHARS).to_string(),
                    source: SummarySource::Truncation,
                }
            }
        }
    }

    pub fn model_version(&self) -> &str {
        &self.model
    }
}

fn build_summary_prompt(title: &str, content: &str) -> String {
    format!(
        "다음 학습 포스트를 2-3문장으로 요약해주세요:\n\n\
         제목: {}\n\
         내용: {}\n\n\
         핵심 내용과 배운 점을 중심으로 간단명료하게 요약해주세요. 마크다운 형식은 사용하지 마세요.",
        title,
        truncate_chars(content, MAX_PROMPT_CONTENT_CHARS)
    )
}

/// Longest prefix of `s` with at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
