mod gemini;
mod report;
mod service;
mod streaming;
mod summarizer;

pub use gemini::GeminiClient;
pub use report::{ReportGenerator, ReportStream};
pub use service::{GenerativeTextService, UnconfiguredTextService};
pub use summarizer::Summarizer;

#[cfg(test)]
pub use service::testing;
