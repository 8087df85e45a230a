use crate::client::GenerateContentApi;
use crate::types::{Content, GenerateContentRequest, GenerationConfig};
use anyhow::Result;
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use std::sync::Arc;

/// A multi-turn chat bound to one model and one system instruction.
///
/// The session owns the history: every message is sent together with all
/// previous exchanges. An exchange is recorded only once its response stream
/// has been read to the end, so a failed or abandoned call can simply be
/// retried.
pub struct ChatSession<C: GenerateContentApi> {
    client: Arc<C>,
    model: String,
    system_instruction: Option<Content>,
    temperature: Option<f32>,
    history: Vec<Content>,
}

impl<C: GenerateContentApi> ChatSession<C> {
    pub fn new(client: Arc<C>, model: &str, system_instruction: &str) -> Self {
        let system_instruction =
            (!system_instruction.is_empty()).then(|| Content::instruction(system_instruction));
        Self {
            client,
            model: model.to_string(),
            system_instruction,
            temperature: None,
            history: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Sends one user message and streams the reply as text deltas.
    pub fn send_message_stream<'a>(
        &'a mut self,
        message: &'a str,
    ) -> impl Stream<Item = Result<String>> + Send + 'a {
        try_stream! {
            let mut contents = self.history.clone();
            contents.push(Content::user(message));
            let request = GenerateContentRequest {
                contents,
                system_instruction: self.system_instruction.clone(),
                generation_config: self
                    .temperature
                    .map(|temperature| GenerationConfig { temperature: Some(temperature) }),
            };

            let mut responses = self
                .client
                .stream_generate_content(&self.model, request)
                .await?;

            let mut reply = String::new();
            while let Some(response) = responses.next().await {
                let delta = response?.text();
                if delta.is_empty() {
                    continue;
                }
                reply.push_str(&delta);
                yield delta;
            }

            self.history.push(Content::user(message));
            self.history.push(Content::model(&reply));
        }
    }
}
