use crate::anthropic_adapter::AnthropicProvider;
use crate::config::Config;
use crate::gemini_adapter::GeminiProvider;
use crate::openai_adapter::{OpenAIProvider, WhisperTranscriber};
use anthropic_chat::AnthropicClient;
use gemini_chat::GeminiClient;
use interview_core::chat_api::Transcriber;
use interview_core::conversation::ConversationSession;
use interview_core::prompts::PromptBook;
use std::sync::Arc;

/// A conversation session with an adapter for every provider that has a
/// credential. Models of the other providers fail at `start`.
pub fn conversation(config: &Config, prompts: PromptBook) -> ConversationSession {
    let mut session = ConversationSession::new(prompts);

    if let Some(key) = &config.google_api_key {
        session.register(Arc::new(GeminiProvider::new(Arc::new(GeminiClient::new(key)))));
    }
    if let Some(client) = openai_client(config) {
        session.register(Arc::new(OpenAIProvider::new(client)));
    }
    if let Some(key) = &config.anthropic_api_key {
        session.register(Arc::new(AnthropicProvider::new(Arc::new(AnthropicClient::new(key)))));
    }

    session
}

/// One-shot transcription, available with an OpenAI credential.
pub fn transcriber(config: &Config) -> Option<Arc<dyn Transcriber>> {
    openai_client(config).map(|client| Arc::new(WhisperTranscriber::new(client)) as Arc<dyn Transcriber>)
}

fn openai_client(config: &Config) -> Option<Arc<openai_chat::Client>> {
    let key = config.openai_api_key.as_deref()?;
    let client_config = openai_chat::Config::builder().with_api_key(key).build();
    Some(Arc::new(openai_chat::Client::new(client_config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::error::ConversationError;
    use interview_core::generic_types::{PromptStyle, ProviderId, SessionConfig};

    fn config_with(openai: Option<&str>, anthropic: Option<&str>) -> Config {
        let lookup = |name: &str| match name {
            "OPENAI_API_KEY" => openai.map(str::to_string),
            "ANTHROPIC_API_KEY" => anthropic.map(str::to_string),
            _ => None,
        };
        match Config::from_lookup(lookup) {
            Ok(config) => config,
            Err(e) => panic!("config failed: {e}"),
        }
    }

    fn session_config(model: &str) -> SessionConfig {
        SessionConfig {
            model: model.to_string(),
            style: PromptStyle::Technical,
            role: "Backend Engineer".to_string(),
            topic: "Databases".to_string(),
            candidate_name: "Alex".to_string(),
        }
    }

    #[test]
    fn providers_without_a_key_are_not_configured() {
        // --- 1. Arrange ---
        let mut session = conversation(&config_with(Some("sk-test"), None), PromptBook::builtin());

        // --- 2. Act ---
        let gemini = session.start(session_config("gemini-2.5-flash"));
        let claude = session.start(session_config("claude-sonnet-4-20250514"));
        let gpt = session.start(session_config("gpt-4o-mini"));

        // --- 3. Assert ---
        assert!(matches!(
            gemini,
            Err(ConversationError::ProviderNotConfigured(ProviderId::Google))
        ));
        assert!(matches!(
            claude,
            Err(ConversationError::ProviderNotConfigured(ProviderId::Anthropic))
        ));
        assert!(gpt.is_ok());
        assert_eq!(session.provider(), Some(ProviderId::OpenAi));
    }

    #[test]
    fn transcription_needs_an_openai_key() {
        assert!(transcriber(&config_with(None, Some("key"))).is_none());
        assert!(transcriber(&config_with(Some("sk-test"), None)).is_some());
    }
}
