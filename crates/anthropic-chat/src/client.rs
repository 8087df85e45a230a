use crate::types::{ApiErrorBody, ErrorEnvelope, MessagesRequest, StreamEvent};
use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use interview_native_utils::sse;
use secrecy::{ExposeSecret, SecretString};
use std::pin::Pin;

const BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// The API rejected the call as a cross-origin request.
///
/// Carried inside the `anyhow::Error` returned by the client so callers can
/// `downcast_ref` it and point the user at a backend proxy.
#[derive(Debug, thiserror::Error)]
#[error("cross-origin request rejected: {message}")]
pub struct CorsRestricted {
    pub message: String,
}

#[async_trait]
pub trait MessagesApi: Send + Sync {
    /// Issues one streaming `messages` request. The stream ends after
    /// `message_stop`.
    async fn stream_messages(&self, request: MessagesRequest) -> Result<EventStream>;
}

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: SecretString::from(api_key.to_string()),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl MessagesApi for AnthropicClient {
    async fn stream_messages(&self, request: MessagesRequest) -> Result<EventStream> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "sending messages request"
        );

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .context("Failed to reach Anthropic API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => api_error(envelope.error),
                Err(_) => anyhow::anyhow!("Anthropic API error ({}): {}", status, body),
            };
            return Err(error);
        }

        Ok(Box::pin(decode_events(response.bytes_stream())))
    }
}

fn api_error(body: ApiErrorBody) -> anyhow::Error {
    if body.message.to_ascii_lowercase().contains("cors") {
        return CorsRestricted {
            message: body.message,
        }
        .into();
    }
    anyhow::anyhow!("Anthropic API error ({}): {}", body.kind, body.message)
}

fn decode_events<S, B, E>(body: S) -> impl Stream<Item = Result<StreamEvent>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    try_stream! {
        let mut events = Box::pin(sse::decode_stream(body));
        while let Some(event) = events.next().await {
            let event = event?;
            let event: StreamEvent = serde_json::from_str(&event.data)
                .with_context(|| format!("Failed to decode Anthropic event: {}", event.data))?;
            match event {
                StreamEvent::Error { error } => Err::<(), _>(api_error(error))?,
                StreamEvent::MessageStop => {
                    yield event;
                    break;
                }
                StreamEvent::MessageDelta { usage: Some(usage) } => {
                    tracing::debug!(
                        "input_tokens: {}, output_tokens: {}",
                        usage.input_tokens,
                        usage.output_tokens
                    );
                    yield event;
                }
                event => yield event,
            }
        }
    }
}
