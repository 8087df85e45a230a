use futures::{Stream, StreamExt};
use gemini_chat::types::ROLE_MODEL;
use gemini_chat::{ChatSession, GenerateContentApi};
use interview_core::chat_api::{ChatHandle, ChatProvider, SnapshotStream};
use interview_core::error::ConversationError;
use interview_core::generic_types::{ConversationTurn, ModelId, ProviderId};
use std::sync::Arc;

pub const TEMPERATURE: f32 = 0.7;

/// Gemini behind the generic provider interface. Each conversation keeps a
/// persistent [`ChatSession`], which owns the history itself.
pub struct GeminiProvider<C: GenerateContentApi> {
    client: Arc<C>,
}

impl<C: GenerateContentApi> GeminiProvider<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

impl<C: GenerateContentApi + 'static> ChatProvider for GeminiProvider<C> {
    fn id(&self) -> ProviderId {
        ProviderId::Google
    }

    fn init(
        &self,
        model: ModelId,
        system_instruction: &str,
    ) -> Result<Box<dyn ChatHandle>, ConversationError> {
        let session = ChatSession::new(Arc::clone(&self.client), model.as_str(), system_instruction)
            .with_temperature(TEMPERATURE);
        Ok(Box::new(GeminiChat { session }))
    }
}

struct GeminiChat<C: GenerateContentApi> {
    session: ChatSession<C>,
}

impl<C: GenerateContentApi + 'static> ChatHandle for GeminiChat<C> {
    fn stream<'a>(&'a mut self, user_text: &'a str) -> SnapshotStream<'a> {
        Box::pin(snapshots(&mut self.session, user_text))
    }

    fn replay_turns(&self) -> Vec<ConversationTurn> {
        self.session
            .history()
            .iter()
            .map(|content| {
                if content.role.as_deref() == Some(ROLE_MODEL) {
                    ConversationTurn::model(content.text())
                } else {
                    ConversationTurn::user(content.text())
                }
            })
            .collect()
    }
}

// The session yields deltas; callers expect the reply so far.
fn snapshots<'a, C: GenerateContentApi>(
    session: &'a mut ChatSession<C>,
    user_text: &'a str,
) -> impl Stream<Item = Result<String, ConversationError>> + Send + 'a {
    async_stream::try_stream! {
        let mut deltas = Box::pin(session.send_message_stream(user_text));
        let mut reply = String::new();
        while let Some(delta) = deltas.next().await {
            let delta = delta.map_err(|e| ConversationError::call_failed(ProviderId::Google, e))?;
            reply.push_str(&delta);
            yield reply.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use gemini_chat::ResponseStream;
    use gemini_chat::types::{GenerateContentRequest, GenerateContentResponse};
    use interview_core::conversation::ConversationSession;
    use interview_core::generic_types::{PromptStyle, SessionConfig};
    use interview_core::prompts::PromptBook;
    use mockall::mock;

    mock! {
        pub GenerateContentApi {}
        #[async_trait]
        impl GenerateContentApi for GenerateContentApi {
            async fn stream_generate_content(
                &self,
                model: &str,
                request: GenerateContentRequest,
            ) -> Result<ResponseStream>;
        }
    }

    fn responses(deltas: &[&str]) -> ResponseStream {
        let items: Vec<Result<GenerateContentResponse>> = deltas
            .iter()
            .map(|text| {
                Ok(serde_json::from_value(serde_json::json!({
                    "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
                }))?)
            })
            .collect();
        Box::pin(futures::stream::iter(items))
    }

    fn behavioral_flash() -> SessionConfig {
        SessionConfig {
            model: "gemini-2.5-flash".to_string(),
            style: PromptStyle::Behavioral,
            role: "Staff Engineer".to_string(),
            topic: "Leadership".to_string(),
            candidate_name: "Sam".to_string(),
        }
    }

    #[tokio::test]
    async fn test_greeting_turn_streams_cumulative_snapshots() -> Result<()> {
        // --- 1. Arrange ---
        let mut api = MockGenerateContentApi::new();
        api.expect_stream_generate_content()
            .withf(|model, request| {
                model.to_string() == "gemini-2.5-flash"
                    && request.contents.len() == 1
                    && request.system_instruction.is_some()
            })
            .times(1)
            .returning(|_, _| Ok(responses(&["Hi", " there", "!"])));

        let mut session = ConversationSession::new(PromptBook::builtin())
            .with_provider(Arc::new(GeminiProvider::new(Arc::new(api))));
        session.start(behavioral_flash())?;

        // --- 2. Act ---
        let mut partials = Vec::new();
        let reply = session
            .send_turn("Hello, I am ready. [Time: 0:00]", |text| {
                partials.push(text.to_string())
            })
            .await?;

        // --- 3. Assert ---
        assert_eq!(partials, ["Hi", "Hi there", "Hi there!"]);
        assert_eq!(reply, "Hi there!");
        assert_eq!(
            session.replay_turns(),
            vec![
                ConversationTurn::user("Hello, I am ready. [Time: 0:00]"),
                ConversationTurn::model("Hi there!"),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_call_is_reported_and_retryable() -> Result<()> {
        // --- 1. Arrange ---
        let mut api = MockGenerateContentApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_stream_generate_content()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(anyhow::anyhow!("Gemini API error (503): overloaded")));
        api.expect_stream_generate_content()
            .withf(|_, request| request.contents.len() == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(responses(&["Welcome."])));

        let provider = GeminiProvider::new(Arc::new(api));
        let Ok(mut handle) = provider.init(ModelId::Pro, "system") else {
            panic!("init failed");
        };

        // --- 2. Act ---
        let failed: Vec<_> = handle.stream("Hello").collect().await;
        let retried: Vec<_> = handle.stream("Hello").collect().await;

        // --- 3. Assert ---
        assert!(matches!(
            failed.as_slice(),
            [Err(ConversationError::ProviderCallFailed { provider: ProviderId::Google, .. })]
        ));
        assert!(matches!(retried.as_slice(), [Ok(text)] if text == "Welcome."));
        assert_eq!(handle.replay_turns().len(), 2);
        Ok(())
    }
}
