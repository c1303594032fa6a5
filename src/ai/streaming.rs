//! Server-sent event parsing for Gemini's `streamGenerateContent?alt=sse`.
//!
//! Bytes are buffered until a full line is available so multi-byte characters
//! split across network chunks decode correctly.

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::{AppError, Result};

use super::gemini::GenerateContentResponse;
use super::service::TextStream;

pub(super) fn sse_text_stream<S>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
{
    Box::pin(stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(next) = bytes.next().await {
            match next {
                Ok(chunk) => buffer.extend_from_slice(&chunk),
                Err(e) => {
                    yield Err(AppError::from(e));
                    return;
                }
            }

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if let Some(item) = parse_sse_line(&String::from_utf8_lossy(&line)) {
                    let failed = item.is_err();
                    yield item;
                    if failed {
                        return;
                    }
                }
            }
        }

        if !buffer.is_empty() {
            if let Some(item) = parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                yield item;
            }
        }
    })
}

/// Text delta carried by one SSE line, if it is a non-empty `data:` line.
pub(super) fn parse_sse_line(line: &str) -> Option<Result<String>> {
    let line = line.trim();
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<GenerateContentResponse>(data) {
        Ok(response) => {
            let text = response.text();
            if text.is_empty() {
                None
            } else {
                Some(Ok(text))
            }
        }
        Err(e) => Some(Err(AppError::GenerationApi(format!(
            "Failed to parse stream chunk: {} (data: {})",
            e,
            data.chars().take(200).collect::<String>()
        )))),
    }
}
