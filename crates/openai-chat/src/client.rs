use crate::types::{
    ApiErrorEnvelope, ChatCompletionChunk, ChatCompletionRequest, TranscriptionResponse,
};
use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use interview_native_utils::sse;
use secrecy::ExposeSecret;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

mod config;
mod consts;
mod stats;

pub use config::{Config, ConfigBuilder};
pub use stats::Stats;

/// Decoded completion chunks, in the order the server sent them.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// The subset of the OpenAI HTTP API the interview runtime relies on.
/// Implemented by [`Client`]; mocked in adapter tests.
#[async_trait]
pub trait OAIClient: Send + Sync {
    /// Issues one streaming chat completion request.
    async fn chat_completion_stream(&self, request: ChatCompletionRequest) -> Result<ChunkStream>;

    /// Transcribes one complete audio file.
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str, mime_type: &str) -> Result<String>;
}

// Holds the HTTP client, configuration, and usage stats guarded by a Mutex.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    config: Arc<Config>,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    /// A client configured from `OPENAI_API_KEY` with default endpoints.
    pub fn from_env() -> Self {
        Self::new(Config::new())
    }

    // Return a copy of the accumulated usage stats.
    pub fn stats(&self) -> Result<Stats> {
        if let Ok(stats_guard) = self.stats.lock() {
            Ok(stats_guard.clone())
        } else {
            Err(anyhow::anyhow!("failed to get stats"))
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }
}

#[async_trait]
impl OAIClient for Client {
    async fn chat_completion_stream(&self, request: ChatCompletionRequest) -> Result<ChunkStream> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(self.url(consts::CHAT_COMPLETIONS_PATH))
            .bearer_auth(self.config.api_key().expose_secret())
            .json(&request)
            .send()
            .await
            .context("Failed to reach OpenAI chat completions endpoint")?;
        let response = error_for_status(response).await?;

        let chunks = decode_chunks(response.bytes_stream(), Arc::clone(&self.stats));
        Ok(Box::pin(chunks))
    }

    async fn transcribe(&self, audio: Vec<u8>, file_name: &str, mime_type: &str) -> Result<String> {
        tracing::debug!(bytes = audio.len(), file_name, "sending transcription request");

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .context("Invalid audio mime type")?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.transcription_model().to_string())
            .text("language", self.config.transcription_language().to_string());

        let response = self
            .http
            .post(self.url(consts::TRANSCRIPTIONS_PATH))
            .bearer_auth(self.config.api_key().expose_secret())
            .multipart(form)
            .send()
            .await
            .context("Failed to reach OpenAI transcription endpoint")?;
        let response = error_for_status(response).await?;

        let transcription = response
            .json::<TranscriptionResponse>()
            .await
            .context("Failed to decode transcription response")?;
        Ok(transcription.text)
    }
}

// Turns a non-2xx response into an error carrying the API's own message.
async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body);
    Err(anyhow::anyhow!("OpenAI API error ({}): {}", status, message))
}

fn decode_chunks<S, B, E>(
    body: S,
    stats: Arc<Mutex<Stats>>,
) -> impl Stream<Item = Result<ChatCompletionChunk>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    try_stream! {
        let mut events = Box::pin(sse::decode_stream(body));
        while let Some(event) = events.next().await {
            let event = event?;
            if event.is_done() {
                break;
            }

            let chunk: ChatCompletionChunk = serde_json::from_str(&event.data)
                .with_context(|| format!("Failed to decode completion chunk: {}", event.data))?;

            if let Some(usage) = chunk.usage {
                record_usage(&stats, usage.total_tokens, usage.prompt_tokens, usage.completion_tokens);
            }
            yield chunk;
        }
    }
}

fn record_usage(stats: &Mutex<Stats>, total: u32, input: u32, output: u32) {
    match stats.lock() {
        Ok(mut stats_guard) => stats_guard.update_usage(total, input, output),
        Err(_) => tracing::error!("failed to update stats"),
    }
    tracing::debug!(
        "total_tokens: {}, input_tokens: {}, output_tokens: {}",
        total,
        input,
        output
    );
}
