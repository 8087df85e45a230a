use crate::replay::PendingTurn;
use anthropic_chat::types::{Message, MessagesRequest, Role};
use anthropic_chat::{CorsRestricted, DEFAULT_MAX_TOKENS, MessagesApi};
use futures::{Stream, StreamExt};
use interview_core::chat_api::{ChatHandle, ChatProvider, SnapshotStream};
use interview_core::error::ConversationError;
use interview_core::generic_types::{ConversationTurn, ModelId, ProviderId};
use std::sync::Arc;

pub const TEMPERATURE: f32 = 0.7;

/// Claude behind the generic provider interface. The message list is replayed
/// on every call; the system instruction travels beside it.
pub struct AnthropicProvider<C: MessagesApi> {
    client: Arc<C>,
}

impl<C: MessagesApi> AnthropicProvider<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

impl<C: MessagesApi + 'static> ChatProvider for AnthropicProvider<C> {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn init(
        &self,
        model: ModelId,
        system_instruction: &str,
    ) -> Result<Box<dyn ChatHandle>, ConversationError> {
        Ok(Box::new(AnthropicChat {
            client: Arc::clone(&self.client),
            model,
            system: system_instruction.to_string(),
            messages: Vec::new(),
        }))
    }
}

struct AnthropicChat<C: MessagesApi> {
    client: Arc<C>,
    model: ModelId,
    system: String,
    messages: Vec<Message>,
}

impl<C: MessagesApi + 'static> ChatHandle for AnthropicChat<C> {
    fn stream<'a>(&'a mut self, user_text: &'a str) -> SnapshotStream<'a> {
        let request = RequestTemplate {
            model: self.model,
            system: &self.system,
        };
        Box::pin(snapshots(
            self.client.as_ref(),
            request,
            &mut self.messages,
            user_text,
        ))
    }

    fn replay_turns(&self) -> Vec<ConversationTurn> {
        self.messages
            .iter()
            .map(|message| match message.role {
                Role::User => ConversationTurn::user(&message.content),
                Role::Assistant => ConversationTurn::model(&message.content),
            })
            .collect()
    }
}

struct RequestTemplate<'a> {
    model: ModelId,
    system: &'a str,
}

impl RequestTemplate<'_> {
    fn build(&self, messages: &[Message]) -> MessagesRequest {
        MessagesRequest {
            model: self.model.as_str().to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: Some(TEMPERATURE),
            system: (!self.system.is_empty()).then(|| self.system.to_string()),
            messages: messages.to_vec(),
            stream: true,
        }
    }
}

fn call_failed(e: anyhow::Error) -> ConversationError {
    if e.downcast_ref::<CorsRestricted>().is_some() {
        tracing::error!("Anthropic rejected a cross-origin request: {:#}", e);
        return ConversationError::ProviderUnsupportedInBrowser(ProviderId::Anthropic);
    }
    ConversationError::call_failed(ProviderId::Anthropic, e)
}

fn snapshots<'a, C: MessagesApi>(
    client: &'a C,
    request: RequestTemplate<'a>,
    messages: &'a mut Vec<Message>,
    user_text: &'a str,
) -> impl Stream<Item = Result<String, ConversationError>> + Send + 'a {
    async_stream::try_stream! {
        let turn = PendingTurn::push(messages, Message::user(user_text));
        let request = request.build(turn.messages());

        let mut events = client.stream_messages(request).await.map_err(call_failed)?;
        let mut reply = String::new();
        while let Some(event) = events.next().await {
            let event = event.map_err(call_failed)?;
            let Some(text) = event.text_delta() else {
                continue;
            };
            reply.push_str(text);
            yield reply.clone();
        }

        turn.commit(Message::assistant(&reply));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anthropic_chat::EventStream;
    use anthropic_chat::types::StreamEvent;
    use anyhow::Result;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub MessagesApi {}
        #[async_trait]
        impl MessagesApi for MessagesApi {
            async fn stream_messages(&self, request: MessagesRequest) -> Result<EventStream>;
        }
    }

    fn events(deltas: &[&str]) -> EventStream {
        let mut items: Vec<Result<StreamEvent>> = vec![Ok(StreamEvent::MessageStart {})];
        for text in deltas {
            let delta = serde_json::from_value(serde_json::json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": { "type": "text_delta", "text": text }
            }));
            items.push(delta.map_err(anyhow::Error::from));
        }
        items.push(Ok(StreamEvent::MessageStop));
        Box::pin(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn test_system_instruction_is_sent_out_of_band() {
        // --- 1. Arrange ---
        let mut mock_client = MockMessagesApi::new();
        let mut seq = mockall::Sequence::new();
        mock_client
            .expect_stream_messages()
            .withf(|request| {
                request.system.as_deref() == Some("Be an interviewer.")
                    && request.messages == [Message::user("Hello")]
                    && request.max_tokens == DEFAULT_MAX_TOKENS
                    && request.model == "claude-sonnet-4-20250514"
                    && request.stream
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(events(&["Good", " morning."])));
        mock_client
            .expect_stream_messages()
            .withf(|request| {
                request.messages
                    == [
                        Message::user("Hello"),
                        Message::assistant("Good morning."),
                        Message::user("Thanks"),
                    ]
                    && request.system.as_deref() == Some("Be an interviewer.")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(events(&["First question."])));

        let provider = AnthropicProvider::new(Arc::new(mock_client));
        let Ok(mut handle) = provider.init(ModelId::Sonnet4, "Be an interviewer.") else {
            panic!("init failed");
        };

        // --- 2. Act ---
        let first: Vec<_> = handle.stream("Hello").collect().await;
        let _: Vec<_> = handle.stream("Thanks").collect().await;

        // --- 3. Assert ---
        let first: Vec<String> = first.into_iter().filter_map(Result::ok).collect();
        assert_eq!(first, ["Good", "Good morning."]);
        assert_eq!(handle.replay_turns().len(), 4);
        assert_eq!(
            handle.replay_turns().last(),
            Some(&ConversationTurn::model("First question."))
        );
    }

    #[tokio::test]
    async fn test_cors_rejection_maps_to_unsupported_in_browser() {
        // --- 1. Arrange ---
        let mut mock_client = MockMessagesApi::new();
        mock_client.expect_stream_messages().times(1).returning(|_| {
            Err(CorsRestricted {
                message: "CORS requests are not allowed".to_string(),
            }
            .into())
        });
        let provider = AnthropicProvider::new(Arc::new(mock_client));
        let Ok(mut handle) = provider.init(ModelId::Sonnet4, "system") else {
            panic!("init failed");
        };

        // --- 2. Act ---
        let results: Vec<_> = handle.stream("Hello").collect().await;

        // --- 3. Assert ---
        assert!(matches!(
            results.as_slice(),
            [Err(ConversationError::ProviderUnsupportedInBrowser(ProviderId::Anthropic))]
        ));
        assert!(handle.replay_turns().is_empty());
    }

    #[tokio::test]
    async fn test_mid_stream_error_discards_the_turn() {
        // --- 1. Arrange ---
        let mut mock_client = MockMessagesApi::new();
        mock_client.expect_stream_messages().times(1).returning(|_| {
            let items: Vec<Result<StreamEvent>> = vec![
                Ok(StreamEvent::MessageStart {}),
                Err(anyhow::anyhow!("Anthropic API error (overloaded_error): Overloaded")),
            ];
            Ok(Box::pin(futures::stream::iter(items)) as EventStream)
        });
        let provider = AnthropicProvider::new(Arc::new(mock_client));
        let Ok(mut handle) = provider.init(ModelId::Sonnet4, "system") else {
            panic!("init failed");
        };

        // --- 2. Act ---
        let results: Vec<_> = handle.stream("Hello").collect().await;

        // --- 3. Assert ---
        assert!(matches!(
            results.as_slice(),
            [Err(ConversationError::ProviderCallFailed { provider: ProviderId::Anthropic, .. })]
        ));
        assert!(handle.replay_turns().is_empty());
    }
}
