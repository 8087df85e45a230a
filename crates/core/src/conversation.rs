use crate::chat_api::{ChatHandle, ChatProvider};
use crate::error::ConversationError;
use crate::generic_types::{ConversationTurn, ModelId, ProviderId, SessionConfig};
use crate::prompts::PromptBook;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;

struct ActiveSession {
    config: SessionConfig,
    model: ModelId,
    system_instruction: String,
    handle: Box<dyn ChatHandle>,
    turns: Vec<ConversationTurn>,
}

/// One interview conversation with exactly one provider handle.
///
/// Callers serialize turns: `send_turn` takes `&mut self`, so a second turn
/// cannot begin before the previous one has resolved.
pub struct ConversationSession {
    providers: HashMap<ProviderId, Arc<dyn ChatProvider>>,
    prompts: PromptBook,
    active: Option<ActiveSession>,
}

impl ConversationSession {
    pub fn new(prompts: PromptBook) -> Self {
        Self {
            providers: HashMap::new(),
            prompts,
            active: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn ChatProvider>) {
        self.providers.insert(provider.id(), provider);
    }

    pub fn prompts(&self) -> &PromptBook {
        &self.prompts
    }

    /// Starts a fresh conversation, discarding any previous one.
    ///
    /// An unmapped model is rejected before any provider is touched and leaves
    /// the current conversation in place.
    pub fn start(&mut self, config: SessionConfig) -> Result<(), ConversationError> {
        let model: ModelId = config.model.parse()?;
        let provider_id = model.provider();
        let system_instruction = self.prompts.system_instruction(&config);

        self.active = None;

        let provider = self
            .providers
            .get(&provider_id)
            .ok_or(ConversationError::ProviderNotConfigured(provider_id))?;
        let handle = provider.init(model, &system_instruction)?;

        tracing::info!(
            provider = %provider_id,
            model = %model,
            style = ?config.style,
            "conversation started"
        );
        self.active = Some(ActiveSession {
            config,
            model,
            system_instruction,
            handle,
            turns: Vec::new(),
        });
        Ok(())
    }

    /// Sends one user message and returns the complete reply.
    ///
    /// `on_partial` is called, in order, with every cumulative snapshot of the
    /// reply. On error the turn is not recorded and the session stays usable.
    pub async fn send_turn<F>(
        &mut self,
        text: &str,
        mut on_partial: F,
    ) -> Result<String, ConversationError>
    where
        F: FnMut(&str),
    {
        let active = self
            .active
            .as_mut()
            .ok_or(ConversationError::SessionNotStarted)?;

        tracing::debug!(model = %active.model, chars = text.len(), "sending turn");
        let mut reply = String::new();
        {
            let mut snapshots = active.handle.stream(text);
            while let Some(snapshot) = snapshots.next().await {
                let snapshot = snapshot.inspect_err(|e| {
                    tracing::warn!(model = %active.model, "turn failed: {}", e);
                })?;
                on_partial(&snapshot);
                reply = snapshot;
            }
        }

        active.turns.push(ConversationTurn::user(text));
        active.turns.push(ConversationTurn::model(reply.clone()));
        Ok(reply)
    }

    pub fn is_started(&self) -> bool {
        self.active.is_some()
    }

    /// Every exchanged turn of the current conversation, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        self.active
            .as_ref()
            .map(|active| active.turns.as_slice())
            .unwrap_or_default()
    }

    /// What the provider handle will replay on the next turn.
    pub fn replay_turns(&self) -> Vec<ConversationTurn> {
        self.active
            .as_ref()
            .map(|active| active.handle.replay_turns())
            .unwrap_or_default()
    }

    pub fn provider(&self) -> Option<ProviderId> {
        self.active.as_ref().map(|active| active.model.provider())
    }

    pub fn model(&self) -> Option<ModelId> {
        self.active.as_ref().map(|active| active.model)
    }

    pub fn config(&self) -> Option<&SessionConfig> {
        self.active.as_ref().map(|active| &active.config)
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.active
            .as_ref()
            .map(|active| active.system_instruction.as_str())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chat_api::{MockChatProvider, SnapshotStream};
    use crate::generic_types::PromptStyle;
    use async_stream::try_stream;
    use std::collections::VecDeque;

    /// A provider handle that replays scripted token lists and keeps replay
    /// state the way a real adapter does.
    pub(crate) struct ScriptedHandle {
        replay: Vec<ConversationTurn>,
        committed: usize,
        script: VecDeque<Result<Vec<&'static str>, &'static str>>,
    }

    impl ScriptedHandle {
        pub(crate) fn new(script: Vec<Result<Vec<&'static str>, &'static str>>) -> Self {
            Self {
                replay: Vec::new(),
                committed: 0,
                script: script.into(),
            }
        }
    }

    impl ChatHandle for ScriptedHandle {
        fn stream<'a>(&'a mut self, user_text: &'a str) -> SnapshotStream<'a> {
            Box::pin(try_stream! {
                self.replay.truncate(self.committed);
                self.replay.push(ConversationTurn::user(user_text));

                let tokens = self.script.pop_front().unwrap_or(Ok(Vec::new()));
                let tokens = match tokens {
                    Ok(tokens) => tokens,
                    Err(message) => {
                        self.replay.truncate(self.committed);
                        Err::<(), _>(ConversationError::call_failed(
                            ProviderId::Google,
                            anyhow::anyhow!(message),
                        ))?;
                        Vec::new()
                    }
                };

                let mut text = String::new();
                for token in tokens {
                    text.push_str(token);
                    yield text.clone();
                }
                self.replay.push(ConversationTurn::model(text));
                self.committed = self.replay.len();
            })
        }

        fn replay_turns(&self) -> Vec<ConversationTurn> {
            self.replay[..self.committed].to_vec()
        }
    }

    pub(crate) fn config(model: &str, style: PromptStyle) -> SessionConfig {
        SessionConfig {
            model: model.to_string(),
            style,
            role: "Product Manager".to_string(),
            topic: "roadmaps".to_string(),
            candidate_name: "Ravi".to_string(),
        }
    }

    pub(crate) fn scripted_provider(
        id: ProviderId,
        script: Vec<Result<Vec<&'static str>, &'static str>>,
    ) -> MockChatProvider {
        let mut provider = MockChatProvider::new();
        provider.expect_id().return_const(id);
        provider
            .expect_init()
            .returning(move |_, _| {
                Ok(Box::new(ScriptedHandle::new(script.clone())) as Box<dyn ChatHandle>)
            });
        provider
    }

    #[tokio::test]
    async fn send_turn_before_start_is_rejected_without_provider_calls() {
        // --- 1. Arrange ---
        let mut provider = MockChatProvider::new();
        provider.expect_id().return_const(ProviderId::OpenAi);
        provider.expect_init().never();
        let mut session =
            ConversationSession::new(PromptBook::builtin()).with_provider(Arc::new(provider));

        // --- 2. Act ---
        let result = session.send_turn("hello", |_| {}).await;

        // --- 3. Assert ---
        assert!(matches!(result, Err(ConversationError::SessionNotStarted)));
        assert!(session.turns().is_empty());
    }

    #[test]
    fn unknown_model_is_rejected_before_any_provider_is_touched() {
        let mut provider = MockChatProvider::new();
        provider.expect_id().return_const(ProviderId::OpenAi);
        provider.expect_init().never();
        let mut session =
            ConversationSession::new(PromptBook::builtin()).with_provider(Arc::new(provider));

        let result = session.start(config("gpt-2", PromptStyle::Technical));

        assert!(matches!(result, Err(ConversationError::UnknownModel(m)) if m == "gpt-2"));
        assert!(!session.is_started());
    }

    #[test]
    fn missing_provider_is_not_configured() {
        let mut session = ConversationSession::new(PromptBook::builtin());
        let result = session.start(config("claude-sonnet-4-20250514", PromptStyle::Technical));
        assert!(matches!(
            result,
            Err(ConversationError::ProviderNotConfigured(ProviderId::Anthropic))
        ));
    }

    #[tokio::test]
    async fn snapshots_are_forwarded_in_order_and_the_last_one_is_returned() {
        // --- 1. Arrange ---
        let provider = scripted_provider(ProviderId::Google, vec![Ok(vec!["Hi", " there", "!"])]);
        let mut session =
            ConversationSession::new(PromptBook::builtin()).with_provider(Arc::new(provider));
        session.start(config("gemini-2.5-flash", PromptStyle::Behavioral)).unwrap();

        // --- 2. Act ---
        let mut partials = Vec::new();
        let reply = session
            .send_turn("Hello, I am ready. [Time: 0:00]", |s| partials.push(s.to_string()))
            .await
            .unwrap();

        // --- 3. Assert ---
        assert_eq!(partials, vec!["Hi", "Hi there", "Hi there!"]);
        assert_eq!(reply, "Hi there!");
        assert!(partials.windows(2).all(|w| w[1].starts_with(&w[0])));
        assert_eq!(session.provider(), Some(ProviderId::Google));
        assert_eq!(session.model(), Some(ModelId::Flash));
    }

    #[tokio::test]
    async fn n_turns_record_two_n_turns_matching_replay_state() {
        for (model, id) in [
            ("gemini-3-pro-preview", ProviderId::Google),
            ("gpt-4o-mini", ProviderId::OpenAi),
            ("claude-sonnet-4-20250514", ProviderId::Anthropic),
        ] {
            let provider = scripted_provider(
                id,
                vec![Ok(vec!["one"]), Ok(vec!["t", "wo"]), Ok(vec!["three"])],
            );
            let mut session =
                ConversationSession::new(PromptBook::builtin()).with_provider(Arc::new(provider));
            session.start(config(model, PromptStyle::Technical)).unwrap();

            for text in ["a", "b", "c"] {
                session.send_turn(text, |_| {}).await.unwrap();
            }

            let expected = vec![
                ConversationTurn::user("a"),
                ConversationTurn::model("one"),
                ConversationTurn::user("b"),
                ConversationTurn::model("two"),
                ConversationTurn::user("c"),
                ConversationTurn::model("three"),
            ];
            assert_eq!(session.turns(), expected.as_slice(), "provider {id}");
            assert_eq!(session.replay_turns(), expected, "provider {id}");
        }
    }

    #[tokio::test]
    async fn failed_turn_is_not_recorded_and_the_session_stays_usable() {
        let provider = scripted_provider(
            ProviderId::OpenAi,
            vec![Err("connection reset"), Ok(vec!["Welcome"])],
        );
        let mut session =
            ConversationSession::new(PromptBook::builtin()).with_provider(Arc::new(provider));
        session.start(config("gpt-4o", PromptStyle::Technical)).unwrap();

        let err = session.send_turn("hi", |_| {}).await.unwrap_err();
        assert!(matches!(err, ConversationError::ProviderCallFailed { .. }));
        assert!(session.turns().is_empty());
        assert!(session.replay_turns().is_empty());

        let reply = session.send_turn("hi", |_| {}).await.unwrap();
        assert_eq!(reply, "Welcome");
        assert_eq!(session.turns().len(), 2);
        assert_eq!(session.replay_turns().len(), 2);
    }

    #[tokio::test]
    async fn start_discards_the_previous_conversation() {
        let mut provider = MockChatProvider::new();
        provider.expect_id().return_const(ProviderId::OpenAi);
        provider
            .expect_init()
            .times(2)
            .returning(|_, _| {
                Ok(Box::new(ScriptedHandle::new(vec![Ok(vec!["ok"])])) as Box<dyn ChatHandle>)
            });
        let mut session =
            ConversationSession::new(PromptBook::builtin()).with_provider(Arc::new(provider));

        session.start(config("gpt-4o", PromptStyle::Technical)).unwrap();
        session.send_turn("first", |_| {}).await.unwrap();
        session.start(config("gpt-4o-mini", PromptStyle::Behavioral)).unwrap();

        assert!(session.turns().is_empty());
        assert!(session.replay_turns().is_empty());
        assert_eq!(session.model(), Some(ModelId::Gpt4oMini));
        assert!(session.system_instruction().is_some_and(|s| s.contains("Ravi")));
    }
}
