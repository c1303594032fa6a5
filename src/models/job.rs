use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Queue payload asking the worker to summarize one post.
///
/// Carries no id of its own; two jobs for the same post are the same job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizationJob {
    #[serde(rename = "postId")]
    pub post_id: i64,
}

impl SummarizationJob {
    pub fn new(post_id: i64) -> Self {
        Self { post_id }
    }

    /// Base64 of the JSON object, as stored on the queue.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64.encode(json))
    }

    pub fn decode(payload: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| AppError::Validation(format!("invalid job payload encoding: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
