use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SummaryStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub summary_status: SummaryStatus,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewPost {
    /// Trims fields and drops blank or repeated tags.
    pub fn normalized(self) -> Self {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.tags {
            let tag = tag.trim().to_string();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        Self {
            title: self.title.trim().to_string(),
            content: self.content,
            tags,
        }
    }
}
