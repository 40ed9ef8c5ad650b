//! OpenAI-compatible streaming provider.
//!
//! Works with the Hugging Face inference router and any endpoint that follows
//! the OpenAI chat completions API. Server-sent events are decoded as the
//! bytes arrive, so a slow reasoning model yields deltas long before it
//! finishes.

use crate::brain::LlmProvider;
use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::types::{ChatRequest, DeltaEvent, DeltaStream, Message, Role};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// OpenAI-compatible streaming chat provider.
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleProvider {
    /// Create a provider, reading the API key from the configured environment
    /// variable or its fallback.
    pub fn new(config: &ProviderConfig, default_model: &str) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                config
                    .fallback_api_key_env
                    .as_ref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.trim().is_empty())
            })
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!(
                    "OpenAI-compatible: env var '{}' not set",
                    config.api_key_env
                ),
            })?;
        Self::new_with_key(config, default_model, api_key)
    }

    /// Create a provider with an explicitly provided API key.
    pub fn new_with_key(
        config: &ProviderConfig,
        default_model: &str,
        api_key: String,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: default_model.to_string(),
        })
    }

    fn messages_to_json(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({ "role": role, "content": msg.content })
            })
            .collect()
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let model = if request.model.is_empty() {
            &self.model
        } else {
            &request.model
        };
        let mut body = json!({
            "model": model,
            "messages": Self::messages_to_json(&request.messages),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "stream": true,
        });
        if let Some(shape) = &request.response_shape {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": shape.name,
                    "schema": shape.schema,
                    "strict": shape.strict,
                }
            });
        }
        body
    }

    /// Parse an SSE `data:` line into JSON. `[DONE]` and non-data lines yield `None`.
    fn parse_sse_line(line: &str) -> Option<Value> {
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            return None;
        }
        serde_json::from_str(data).ok()
    }

    /// Map an HTTP error status to an `LlmError`.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed");
                LlmError::AuthFailed {
                    provider: "OpenAI-compatible".to_string(),
                }
            }
            429 => {
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim_end_matches('s').parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            408 | 504 => LlmError::Timeout { timeout_secs: 0 },
            status if status >= 500 => LlmError::ApiRequest {
                message: format!("Server error ({status}): {body}"),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {status}: {body}"),
            },
        }
    }

    fn map_send_error(e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout { timeout_secs: 0 }
        } else if e.is_connect() {
            LlmError::Connection {
                message: e.to_string(),
            }
        } else {
            LlmError::ApiRequest {
                message: format!("Request failed: {e}"),
            }
        }
    }
}

/// What a single SSE line means for the delta stream.
#[derive(Debug)]
enum SseLine {
    Skip,
    Done,
    Delta(DeltaEvent),
    Failed(LlmError),
}

fn classify_line(line: &str) -> SseLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    if line.strip_prefix("data:").map(str::trim) == Some("[DONE]") {
        return SseLine::Done;
    }
    let Some(chunk) = OpenAiCompatibleProvider::parse_sse_line(line) else {
        if line.starts_with("data:") {
            warn!(line = %line, "Skipping unparseable stream chunk");
        }
        return SseLine::Skip;
    };
    if let Some(error) = chunk.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return SseLine::Failed(LlmError::Streaming { message });
    }
    match delta_from_chunk(&chunk) {
        Some(event) => SseLine::Delta(event),
        None => SseLine::Skip,
    }
}

/// Pull content and reasoning text out of one chat-completion chunk.
///
/// Reasoning arrives as `reasoning_content` on most servers and as
/// `reasoning` on some.
fn delta_from_chunk(chunk: &Value) -> Option<DeltaEvent> {
    let delta = chunk.get("choices")?.get(0)?.get("delta")?;
    let text = |key: &str| {
        delta
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let event = DeltaEvent {
        content_delta: text("content"),
        reasoning_delta: text("reasoning_content").or_else(|| text("reasoning")),
    };
    (!event.is_empty()).then_some(event)
}

/// Incremental SSE decoder over a byte stream.
struct SseDecoder {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<DeltaEvent, LlmError>>,
    finished: bool,
}

impl SseDecoder {
    fn new(bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>) -> Self {
        Self {
            bytes,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Split complete lines off the buffer. Bytes of an unfinished line stay
    /// buffered, so multi-byte characters split across chunks survive.
    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
            if self.finished {
                break;
            }
        }
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.handle_line(&String::from_utf8_lossy(&line));
        }
        self.finished = true;
    }

    fn handle_line(&mut self, line: &str) {
        if self.finished {
            return;
        }
        match classify_line(line) {
            SseLine::Skip => {}
            SseLine::Done => self.finished = true,
            SseLine::Delta(event) => self.pending.push_back(Ok(event)),
            SseLine::Failed(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }

    fn into_stream(self) -> DeltaStream {
        futures::stream::unfold(self, |mut decoder| async move {
            loop {
                if let Some(item) = decoder.pending.pop_front() {
                    return Some((item, decoder));
                }
                if decoder.finished {
                    return None;
                }
                match decoder.bytes.next().await {
                    Some(Ok(chunk)) => decoder.feed(&chunk),
                    Some(Err(e)) => {
                        decoder.finished = true;
                        let error = LlmError::Streaming {
                            message: format!("Failed to read stream: {e}"),
                        };
                        return Some((Err(error), decoder));
                    }
                    None => decoder.flush(),
                }
            }
        })
        .boxed()
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn chat_stream(&self, request: ChatRequest) -> Result<DeltaStream, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);
        debug!(
            url = %url,
            model = %body["model"],
            strict = request.response_shape.is_some(),
            "Starting streaming chat request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(SseDecoder::new(bytes).into_stream())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "openai_compat"
    }
}
