use crate::replay::PendingTurn;
use anyhow::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use interview_core::chat_api::{ChatHandle, ChatProvider, SnapshotStream, Transcriber};
use interview_core::error::ConversationError;
use interview_core::generic_types::{ConversationTurn, ModelId, ProviderId};
use openai_chat::OAIClient;
use openai_chat::types::{ChatCompletionRequest, ChatMessage, MessageRole};
use std::sync::Arc;

pub const TEMPERATURE: f32 = 0.7;

/// Chat completions behind the generic provider interface.
///
/// The API is stateless, so every call replays the whole flat message list,
/// starting with the system instruction.
pub struct OpenAIProvider<C: OAIClient> {
    client: Arc<C>,
}

impl<C: OAIClient> OpenAIProvider<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

impl<C: OAIClient + 'static> ChatProvider for OpenAIProvider<C> {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn init(
        &self,
        model: ModelId,
        system_instruction: &str,
    ) -> Result<Box<dyn ChatHandle>, ConversationError> {
        Ok(Box::new(OpenAIChat {
            client: Arc::clone(&self.client),
            model,
            messages: vec![ChatMessage::system(system_instruction)],
        }))
    }
}

struct OpenAIChat<C: OAIClient> {
    client: Arc<C>,
    model: ModelId,
    messages: Vec<ChatMessage>,
}

impl<C: OAIClient + 'static> ChatHandle for OpenAIChat<C> {
    fn stream<'a>(&'a mut self, user_text: &'a str) -> SnapshotStream<'a> {
        Box::pin(snapshots(
            self.client.as_ref(),
            self.model,
            &mut self.messages,
            user_text,
        ))
    }

    fn replay_turns(&self) -> Vec<ConversationTurn> {
        self.messages
            .iter()
            .filter_map(|message| match message.role {
                MessageRole::System => None,
                MessageRole::User => Some(ConversationTurn::user(&message.content)),
                MessageRole::Assistant => Some(ConversationTurn::model(&message.content)),
            })
            .collect()
    }
}

fn call_failed(e: anyhow::Error) -> ConversationError {
    ConversationError::call_failed(ProviderId::OpenAi, e)
}

fn snapshots<'a, C: OAIClient>(
    client: &'a C,
    model: ModelId,
    messages: &'a mut Vec<ChatMessage>,
    user_text: &'a str,
) -> impl Stream<Item = Result<String, ConversationError>> + Send + 'a {
    async_stream::try_stream! {
        let turn = PendingTurn::push(messages, ChatMessage::user(user_text));
        let request = ChatCompletionRequest::new(model.as_str(), turn.messages().to_vec())
            .with_temperature(TEMPERATURE)
            .streaming();

        let mut chunks = client.chat_completion_stream(request).await.map_err(call_failed)?;
        let mut reply = String::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(call_failed)?;
            if chunk.text().is_empty() {
                continue;
            }
            reply.push_str(chunk.text());
            yield reply.clone();
        }

        turn.commit(ChatMessage::assistant(&reply));
    }
}

/// Whisper transcription of one recorded clip.
pub struct WhisperTranscriber<C: OAIClient> {
    client: Arc<C>,
}

impl<C: OAIClient> WhisperTranscriber<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: OAIClient> Transcriber for WhisperTranscriber<C> {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String> {
        let text = self.client.transcribe(wav, "audio.wav", "audio/wav").await?;
        Ok(text.trim().to_string())
    }
}
