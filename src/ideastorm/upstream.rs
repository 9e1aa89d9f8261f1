//! Upstream inference client.
//!
//! [`InferenceClient`] is the seam between the orchestration core and the
//! remote text-generation service. [`HttpInferenceClient`] is the concrete
//! implementation speaking the chat-completions wire format over HTTP, with
//! one transparent fallback to a backup endpoint on transport failure.
//!
//! Streaming responses are exposed as a typed stream of [`StreamEvent`]s;
//! every invocation yields exactly one terminal event ([`StreamEvent::Done`]
//! or [`StreamEvent::Error`]), never both, never neither.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ideastorm::config::UpstreamConfig;
use crate::ideastorm::error::InferenceError;
use crate::ideastorm::http_pool::get_http_client;

/// One element of a streaming inference response.
#[derive(Debug)]
pub enum StreamEvent {
    /// An incremental piece of generated content.
    Chunk(String),
    /// The stream finished normally. Terminal.
    Done,
    /// The stream failed. Terminal.
    Error(InferenceError),
}

/// Boxed stream of [`StreamEvent`]s returned by [`InferenceClient::send_stream`].
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Interface to the remote text-generation service.
///
/// Implementations must be shareable across tasks; the orchestrator holds
/// one behind an `Arc` and calls it from many concurrent workers.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Send one non-streaming request and return the generated content.
    async fn send(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, InferenceError>;

    /// Send one streaming request. Failures are delivered in-stream as the
    /// terminal [`StreamEvent::Error`] rather than through the return type.
    async fn send_stream(&self, system_prompt: &str, user_prompt: &str) -> EventStream;

    /// Lightweight probe used by the health monitor. Default implementation
    /// sends a tiny fixed prompt and checks for non-empty content.
    async fn validate_connection(&self) -> bool {
        match self
            .send(
                "You are a helpful assistant.",
                "Hello, this is a connection test.",
            )
            .await
        {
            Ok(content) => !content.trim().is_empty(),
            Err(_) => false,
        }
    }
}

// Chat-completions wire format.

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// HTTP implementation of [`InferenceClient`].
pub struct HttpInferenceClient {
    config: UpstreamConfig,
    client: reqwest::Client,
}

impl HttpInferenceClient {
    pub fn new(config: UpstreamConfig) -> Self {
        let client = get_http_client(&config.base_url, config.request_timeout);
        Self { config, client }
    }

    fn build_request(&self, system_prompt: &str, user_prompt: &str, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt.to_string(),
                },
            ],
            stream,
        }
    }

    fn primary_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn backup_url(&self) -> String {
        format!("{}/chat/completions", self.config.backup_url)
    }

    async fn post(
        &self,
        url: &str,
        request: &ChatRequest,
    ) -> Result<reqwest::Response, InferenceError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Upstream(format!(
                "HTTP {}: {}",
                status, body
            )));
        }
        Ok(response)
    }

    /// Try the primary endpoint; on a transport or HTTP-level failure, retry
    /// once against the backup endpoint before surfacing the error.
    async fn post_with_fallback(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::Response, InferenceError> {
        match self.post(&self.primary_url(), request).await {
            Ok(response) => Ok(response),
            Err(primary_err) => {
                log::warn!(
                    "primary endpoint failed, trying backup: {}",
                    primary_err
                );
                self.post(&self.backup_url(), request).await
            }
        }
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<String, InferenceError> {
        let response = self.post_with_fallback(request).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Upstream(format!("malformed response body: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(InferenceError::EmptyResponse);
        }

        log::debug!("inference succeeded, response length: {}", content.len());
        Ok(content)
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn send(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, InferenceError> {
        let request = self.build_request(system_prompt, user_prompt, false);
        self.send_once(&request).await
    }

    async fn send_stream(&self, system_prompt: &str, user_prompt: &str) -> EventStream {
        let request = self.build_request(system_prompt, user_prompt, true);
        let (tx, rx) = mpsc::channel::<StreamEvent>(32);

        let result = self.post_with_fallback(&request).await;

        tokio::spawn(async move {
            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    let _ = tx.send(StreamEvent::Error(err)).await;
                    return;
                }
            };

            let mut body = response.bytes_stream();
            let mut buffer = String::new();
            let mut terminated = false;

            while let Some(piece) = body.next().await {
                let bytes = match piece {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        let _ = tx
                            .send(StreamEvent::Error(InferenceError::Transport(
                                err.to_string(),
                            )))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Server-sent events: one `data:` payload per line.
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let payload = match line.strip_prefix("data:") {
                        Some(rest) => rest.trim(),
                        None => continue,
                    };

                    if payload == "[DONE]" {
                        let _ = tx.send(StreamEvent::Done).await;
                        terminated = true;
                        break;
                    }

                    if let Ok(chunk) = serde_json::from_str::<StreamChunk>(payload) {
                        let delta = chunk
                            .choices
                            .into_iter()
                            .next()
                            .map(|choice| choice.delta)
                            .unwrap_or_default();
                        if let Some(content) = delta.content {
                            if tx.send(StreamEvent::Chunk(content)).await.is_err() {
                                return;
                            }
                        }
                    }
                }

                if terminated {
                    return;
                }
            }

            // Upstream closed the connection without a [DONE] marker; the
            // stream still ends with exactly one terminal event.
            let _ = tx.send(StreamEvent::Done).await;
        });

        Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }))
    }
}
