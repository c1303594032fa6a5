use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use tokio::time::{timeout_at, Instant};
use tracing::{error, warn};

use crate::error::{AppError, Result};
use crate::models::{Post, TagStat};

use super::service::GenerativeTextService;

/// Chunks of a generated report. An `Err` item is terminal and means the
/// model failed after some text was already produced.
pub type ReportStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

pub const EMPTY_PERIOD_MESSAGE: &str = "이번 달에 작성된 포스트가 없습니다. 학습을 시작해보세요!";

const SAMPLE_POSTS: usize = 5;
const TOP_TAGS: usize = 5;

pub struct ReportGenerator {
    service: Arc<dyn GenerativeTextService>,
    model: String,
    timeout: Duration,
}

impl ReportGenerator {
    pub fn new(service: Arc<dyn GenerativeTextService>, model: String, timeout: Duration) -> Self {
        Self {
            service,
            model,
            timeout,
        }
    }

    /// Stream a monthly report for `posts`.
    ///
    /// If the model fails before producing any text the stream yields one
    /// offline fallback report and ends normally.
    pub fn generate(&self, posts: Vec<Post>) -> ReportStream {
        let service = Arc::clone(&self.service);
        let model = self.model.clone();
        let timeout = self.timeout;

        Box::pin(stream! {
            let deadline = Instant::now() + timeout;

            if posts.is_empty() {
                yield Ok(EMPTY_PERIOD_MESSAGE.to_string());
                return;
            }

            let tag_stats = calculate_tag_stats(&posts);
            let prompt = build_report_prompt(&posts, &tag_stats);

            let mut emitted = false;
            let mut failure: Option<AppError> = None;

            match timeout_at(deadline, service.generate_stream(&model, &prompt)).await {
                Err(_) => failure = Some(AppError::GenerationTimeout),
                Ok(Err(e)) => failure = Some(e),
                Ok(Ok(mut chunks)) => loop {
                    match timeout_at(deadline, chunks.next()).await {
                        Err(_) => {
                            failure = Some(AppError::GenerationTimeout);
                            break;
                        }
                        Ok(None) => break,
                        Ok(Some(Err(e))) => {
                            failure = Some(e);
                            break;
                        }
                        Ok(Some(Ok(text))) => {
                            if text.is_empty() {
                                continue;
                            }
                            emitted = true;
                            yield Ok(text);
                        }
                    }
                },
            }

            if !emitted && failure.is_none() {
                failure = Some(AppError::GenerationEmpty);
            }

            if let Some(e) = failure {
                if emitted {
                    error!(
                        error = %e,
                        class = e.class(),
                        post_count = posts.len(),
                        "report stream failed after partial output"
                    );
                    yield Err(e);
                } else {
                    warn!(
                        error = %e,
                        class = e.class(),
                        post_count = posts.len(),
                        tag_count = tag_stats.len(),
                        "report generation failed, using fallback report"
                    );
                    yield Ok(build_fallback_report(&posts, &tag_stats));
                }
            }
        })
    }
}

/// Tag counts across `posts`, most frequent first. Ties keep the order in
/// which tags were first seen.
pub fn calculate_tag_stats(posts: &[Post]) -> Vec<TagStat> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut stats: Vec<TagStat> = Vec::new();

    for tag in posts.iter().flat_map(|p| p.tags.iter()) {
        match index.get(tag.as_str()) {
            Some(&i) => stats[i].count += 1,
            None => {
                index.insert(tag.as_str(), stats.len());
                stats.push(TagStat {
                    name: tag.clone(),
                    count: 1,
                });
            }
        }
    }

    // stable
    stats.sort_by(|a, b| b.count.cmp(&a.count));
    stats
}

pub fn build_report_prompt(posts: &[Post], tag_stats: &[TagStat]) -> String {
    let tag_summary = if tag_stats.is_empty() {
        "태그 없음".to_string()
    } else {
        tag_stats
            .iter()
            .map(|t| format!("{} ({}회)", t.name, t.count))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let post_summaries = posts
        .iter()
        .take(SAMPLE_POSTS)
        .map(|p| {
            let summary = p
                .summary
                .as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or("요약 없음");
            format!("- {}: {}", p.title, summary)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "당신은 개발자의 학습을 돕는 AI 멘토입니다. 사용자의 월간 학습 포스트를 분석하고, 요약과 피드백을 제공합니다.\n\n\
         이번 달 학습 데이터:\n\
         - 총 포스트 수: {}개\n\
         - 주요 학습 태그: {}\n\n\
         최근 포스트 샘플:\n\
         {}\n\n\
         다음 내용을 포함한 월간 리포트를 작성해주세요:\n\
         1. 이번 달 학습 요약 (2-3문장)\n\
         2. 주요 학습 주제 및 태그 비율 분석\n\
         3. 다음 달 학습 방향 제안 (구체적으로)\n\n\
         마크다운 형식으로 작성해주세요.",
        posts.len(),
        tag_summary,
        post_summaries
    )
}

/// Report assembled without the model. Pure, so it cannot fail.
pub fn build_fallback_report(posts: &[Post], tag_stats: &[TagStat]) -> String {
    let total = posts.len();
    let top_tags = &tag_stats[..tag_stats.len().min(TOP_TAGS)];

    let tag_lines = if top_tags.is_empty() {
        "- 태그가 설정되지 않았습니다.".to_string()
    } else {
        top_tags
            .iter()
            .enumerate()
            .map(|(i, t)| {
                format!(
                    "{}. **{}** - {}회 ({}%)",
                    i + 1,
                    t.name,
                    t.count,
                    percentage(t.count, total)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let suggestion = match top_tags.first() {
        Some(top) => format!(
            "가장 많이 학습하신 주제는 **{}**입니다. 계속해서 심화 학습을 진행하거나, 관련된 새로운 주제를 탐구해보세요.",
            top.name
        ),
        None => "다양한 주제로 학습을 시작해보세요. 태그를 활용하면 학습 패턴을 더 잘 분석할 수 있습니다."
            .to_string(),
    };

    format!(
        "# 월간 학습 리포트\n\n\
         ## 이번 달 학습 요약\n\n\
         이번 달에는 총 **{}개**의 포스트를 작성하셨습니다.\n\n\
         ## 주요 학습 태그\n\n\
         {}\n\n\
         ## 학습 방향 제안\n\n\
         {}\n\n\
         ---\n\n\
         *AI 분석이 일시적으로 불가능하여 기본 리포트를 제공합니다. 잠시 후 다시 시도해 주세요.*",
        total, tag_lines, suggestion
    )
}

fn percentage(count: usize, total: usize) -> u64 {
    if total == 0 {
        return 0;
    }
    (count as f64 * 100.0 / total as f64).round() as u64
}
