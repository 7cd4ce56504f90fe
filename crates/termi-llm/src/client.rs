//! Streaming chat-completions client
//!
//! The agent only sees [`ModelClient`]: "send this history, get back a lazy
//! stream of text fragments". [`OpenAiClient`] implements it for any
//! OpenAI-compatible endpoint (OpenAI, DeepSeek, vLLM, llama.cpp server, ...).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use crate::config::{ModelConfig, RetryConfig};
use crate::error::{extract_api_error_message, LlmError, LlmErrorKind};
use crate::message::{ChatMessage, Role};

/// Lazy sequence of text fragments. Ends with `None` on a clean finish, or
/// with one `Err` when the transport fails mid-stream. Dropping it releases
/// the underlying connection.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Anything that can turn a conversation history into a fragment stream
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn send(&self, history: &[ChatMessage]) -> Result<FragmentStream, LlmError>;

    /// Model identifier, for display and logging
    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    /// OpenAI expects the arguments as a JSON-encoded string
    arguments: String,
}

impl<'a> WireMessage<'a> {
    fn from_message(msg: &'a ChatMessage) -> Self {
        let tool_calls = msg.tool_calls.as_ref().filter(|c| !c.is_empty()).map(|calls| {
            calls
                .iter()
                .map(|call| WireToolCall {
                    id: &call.id,
                    call_type: "function",
                    function: WireFunction {
                        name: &call.name,
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect()
        });

        Self {
            role: msg.role,
            content: &msg.content,
            tool_calls,
            tool_call_id: msg.tool_call_id.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` streaming endpoints
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: ModelConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| LlmError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// One attempt at opening the stream
    async fn open(&self, history: &[ChatMessage]) -> Result<reqwest::Response, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::auth("No API key configured (set OPENAI_API_KEY)"))?;

        let body = ChatRequest {
            model: &self.config.model,
            messages: history.iter().map(WireMessage::from_message).collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        let request = self
            .client
            .post(self.config.chat_url())
            .bearer_auth(api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.config.connect_timeout(), request)
            .await
            .map_err(|_| {
                LlmError::network(format!(
                    "No response from {} after {}s",
                    self.config.base_url, self.config.connect_timeout_secs
                ))
            })??;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), &text));
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    #[instrument(skip(self, history), fields(model = %self.config.model, messages = history.len()))]
    async fn send(&self, history: &[ChatMessage]) -> Result<FragmentStream, LlmError> {
        let response = with_retry(&self.config.retry, || self.open(history)).await?;
        Ok(fragments_from_bytes(
            response.bytes_stream(),
            self.config.idle_timeout(),
        ))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Run `attempt` until it succeeds, fails with a non-retryable error, or
/// `retry.max_attempts` is used up, sleeping the backoff between tries
pub async fn with_retry<T, F, Fut>(retry: &RetryConfig, mut attempt: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut tries = 1;

    loop {
        match attempt().await {
            Ok(value) => {
                debug!(attempt = tries, "Stream opened");
                return Ok(value);
            }
            Err(e) if e.is_retryable() && tries < retry.max_attempts => {
                let delay = retry.backoff(tries);
                warn!(attempt = tries, error = %e, delay_ms = delay.as_millis() as u64, "Model request failed, retrying");
                tokio::time::sleep(delay).await;
                tries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Decode an SSE byte stream of chat-completion chunks into text fragments
pub fn fragments_from_bytes<S, B, E>(bytes: S, idle_timeout: Duration) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut events = Box::pin(bytes.eventsource());

        loop {
            let event = match tokio::time::timeout(idle_timeout, events.next()).await {
                Ok(Some(Ok(event))) => event,
                Ok(Some(Err(e))) => {
                    yield Err(LlmError::network(format!("SSE stream error: {}", e)));
                    return;
                }
                Ok(None) => {
                    warn!("SSE stream closed without [DONE] or finish_reason");
                    return;
                }
                Err(_) => {
                    yield Err(LlmError::network(format!(
                        "SSE stream idle for {:.1}s",
                        idle_timeout.as_secs_f64()
                    )));
                    return;
                }
            };

            let data = event.data.trim();
            trace!(data = %data, "SSE event");
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                return;
            }

            if let Some(message) = extract_api_error_message(data) {
                yield Err(LlmError::new(LlmErrorKind::ServerError, format!("SSE API error: {}", message)));
                return;
            }

            let chunk: StreamChunk = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(LlmError::decode(format!("SSE parsing error: {}, data: {}", e, data)));
                    return;
                }
            };

            let Some(choice) = chunk.choices.into_iter().next() else {
                // keepalive or usage-only chunk
                continue;
            };

            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    yield Ok(content);
                }
            }

            if let Some(reason) = choice.finish_reason {
                debug!(finish_reason = %reason, "Stream finished");
                return;
            }
        }
    })
}
