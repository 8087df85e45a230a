use crate::types::{ErrorEnvelope, GenerateContentRequest, GenerateContentResponse};
use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use interview_native_utils::sse;
use secrecy::{ExposeSecret, SecretString};
use std::pin::Pin;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>;

/// Streaming `generateContent`, the only call a chat session needs.
#[async_trait]
pub trait GenerateContentApi: Send + Sync {
    async fn stream_generate_content(
        &self,
        model: &str,
        request: GenerateContentRequest,
    ) -> Result<ResponseStream>;
}

/// A client for the Gemini REST API.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl GeminiClient {
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

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }
}

#[async_trait]
impl GenerateContentApi for GeminiClient {
    async fn stream_generate_content(
        &self,
        model: &str,
        request: GenerateContentRequest,
    ) -> Result<ResponseStream> {
        tracing::debug!(model, contents = request.contents.len(), "streamGenerateContent");

        let response = self
            .http
            .post(self.stream_url(model))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .context("Failed to reach Gemini API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            anyhow::bail!("Gemini API error ({}): {}", status, message);
        }

        Ok(Box::pin(decode_responses(response.bytes_stream())))
    }
}

fn decode_responses<S, B, E>(body: S) -> impl Stream<Item = Result<GenerateContentResponse>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    try_stream! {
        let mut events = Box::pin(sse::decode_stream(body));
        while let Some(event) = events.next().await {
            let event = event?;
            let response: GenerateContentResponse = serde_json::from_str(&event.data)
                .with_context(|| format!("Failed to decode Gemini chunk: {}", event.data))?;
            if let Some(error) = &response.error {
                Err::<(), _>(anyhow::anyhow!("Gemini stream error ({}): {}", error.code, error.message))?;
            }
            yield response;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decode_responses_surfaces_inline_errors() {
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\n\n".to_vec()),
            Ok(b"data: {\"error\":{\"code\":429,\"message\":\"quota\"}}\n\n".to_vec()),
        ];
        let results: Vec<_> = decode_responses(futures::stream::iter(chunks)).collect().await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().map(|r| r.text()).ok(), Some("Hi".to_string()));
        let err = results[1].as_ref().err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("quota"));
    }

    #[test]
    fn stream_url_targets_sse_endpoint() {
        let client = GeminiClient::new("key").with_base_url("http://localhost:9000/v1beta/");
        assert_eq!(
            client.stream_url("gemini-2.5-flash"),
            "http://localhost:9000/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }
}
