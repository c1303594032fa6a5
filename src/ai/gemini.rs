use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::service::{GenerativeTextService, TextStream};
use super::streaming::sse_text_stream;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated.
    pub(super) fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Google Gemini REST client.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_API_URL.to_string(),
        })
    }

    fn request_body(prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
        }
    }

    async fn post(&self, url: String, prompt: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(AppError::GenerationApi(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl GenerativeTextService for GeminiClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/{}:generateContent", self.base_url, model);
        let response = self.post(url, prompt).await?;
        let body: GenerateContentResponse = response.json().await?;
        Ok(body.text())
    }

    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<TextStream> {
        let url = format!("{}/{}:streamGenerateContent?alt=sse", self.base_url, model);
        let response = self.post(url, prompt).await?;
        Ok(sse_text_stream(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(GeminiClient::request_body("hello")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}]
            })
        );
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let body: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[
                {"content":{"role":"model","parts":[{"text":"Hello, "},{"text":"world"}]}},
                {"content":{"parts":[{"text":"ignored"}]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(body.text(), "Hello, world");
    }

    #[test]
    fn blocked_response_has_no_text() {
        let body: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert_eq!(body.text(), "");
    }
}
