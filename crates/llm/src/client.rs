use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use crate::error::LlmError;
use crate::wire::{ChatChunk, ChatCompletionRequest};

/// Default model when `THREADLINE_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Retries for establishing a streaming request. Only the initial
/// connection is retried; once chunks are flowing a failure ends the turn.
const MAX_RETRIES: usize = 3;
const RETRY_DELAYS: [u64; 4] = [0, 1, 2, 4];

pub(crate) type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>>;

/// Client for an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct LlmClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) model: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("client", &self.client)
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl LlmClient {
    /// Creates a new client with the given API key and base URL.
    ///
    /// No total request timeout is set: responses stream. Stalled streams
    /// are cut by the read timeout instead.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built (TLS backend failure).
    pub fn new(api_key: String, base_url: String) -> Result<Self, LlmError> {
        let model = std::env::var("THREADLINE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_owned());
        let base_url = base_url.trim_end_matches('/').to_owned();
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .read_timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::ClientInit(e.to_string()))?;
        Ok(Self { client, api_key, base_url, model })
    }

    /// Sets a custom model for this client.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Returns the model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Open one streaming chat completion. Transient failures (transport
    /// errors, 429/5xx) are retried with backoff before the stream starts.
    ///
    /// # Errors
    /// Returns an error if the API keeps failing after all retries or
    /// responds with a non-transient status.
    pub(crate) async fn open_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay_secs = RETRY_DELAYS.get(attempt).copied().unwrap_or(4);
                let delay = std::time::Duration::from_secs(delay_secs);
                tokio::time::sleep(delay).await;
                tracing::warn!("LLM retry attempt {attempt}/{MAX_RETRIES} after {delay:?}");
            }

            let response_result = self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(request)
                .send()
                .await;

            let response = match response_result {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::HttpRequest(e));
                    continue;
                },
            };

            let status = response.status();
            if status.is_success() {
                return Ok(chunk_stream(response));
            }

            let status_code = status.as_u16();
            let body =
                response.text().await.unwrap_or_else(|_| "Could not read error body".to_owned());

            let err = LlmError::HttpStatus { code: status_code, body };
            if err.is_transient() {
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(LlmError::RetriesExhausted(Box::new(last_error.unwrap_or(LlmError::EmptyResponse))))
    }
}

/// Turn an SSE response body into a stream of parsed chunks.
///
/// Lines that are not `data:` payloads (comments, keepalives) are ignored,
/// as are payloads that fail to parse. `data: [DONE]` ends the stream.
fn chunk_stream(response: reqwest::Response) -> ChunkStream {
    Box::pin(async_stream::stream! {
        let mut bytes = response.bytes_stream();
        let mut buffer = String::new();
        'read: while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(LlmError::HttpRequest(e));
                    return;
                },
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].to_owned();
                buffer.drain(..=newline);
                if let Some(data) = sse_data(&line) {
                    if data == "[DONE]" {
                        break 'read;
                    }
                    match serde_json::from_str::<ChatChunk>(data) {
                        Ok(parsed) => yield Ok(parsed),
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                line = truncate(data, 200),
                                "skipping unparseable stream line"
                            );
                        },
                    }
                }
            }
        }
        // Trailing payload without a final newline.
        if let Some(data) = sse_data(&buffer) {
            if data != "[DONE]" {
                if let Ok(parsed) = serde_json::from_str::<ChatChunk>(data) {
                    yield Ok(parsed);
                }
            }
        }
    })
}

/// Extract the payload of an SSE `data:` line, if it is one.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.trim().strip_prefix("data:").map(str::trim_start)
}

/// Truncates a string to the given maximum length at a char boundary.
#[must_use]
pub(crate) fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        let mut end = max_len;
        while end > 0 && !s.is_char_boundary(end) {
            end = end.saturating_sub(1);
        }
        s.get(..end).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_data_extracts_payload() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data: [DONE]"), Some("[DONE]"));
    }

    #[test]
    fn sse_data_ignores_non_data_lines() {
        assert_eq!(sse_data(""), None);
        assert_eq!(sse_data(": keepalive"), None);
        assert_eq!(sse_data("event: ping"), None);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        // Multibyte char straddling the cut point.
        assert_eq!(truncate("héllo", 2), "h");
    }
}
