use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "PENDING",
            ReportStatus::Processing => "PROCESSING",
            ReportStatus::Completed => "COMPLETED",
            ReportStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ReportStatus::Pending),
            "PROCESSING" => Some(ReportStatus::Processing),
            "COMPLETED" => Some(ReportStatus::Completed),
            "FAILED" => Some(ReportStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeriodType {
    Weekly,
    Monthly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Weekly => "WEEKLY",
            PeriodType::Monthly => "MONTHLY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WEEKLY" => Some(PeriodType::Weekly),
            "MONTHLY" => Some(PeriodType::Monthly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub post_count: i64,
    pub period_type: PeriodType,
    pub status: ReportStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub user_id: i64,
    pub post_count: i64,
    pub period_type: PeriodType,
    pub status: ReportStatus,
}

/// Tag occurrence count across a set of posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagStat {
    pub name: String,
    pub count: usize,
}
