use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SummaryStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Pending => "PENDING",
            SummaryStatus::Completed => "COMPLETED",
            SummaryStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(SummaryStatus::Pending),
            "COMPLETED" => Some(SummaryStatus::Completed),
            "FAILED" => Some(SummaryStatus::Failed),
            _ => None,
        }
    }
}

/// Where a stored summary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarySource {
    Model,
    Truncation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSummary {
    pub content: String,
    pub source: SummarySource,
}
