use crate::generic_types::ProviderId;
use thiserror::Error;

/// Failures of the conversation side. None of them end the process; after a
/// failed turn the session can be used again.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("no API key configured for {0}")]
    ProviderNotConfigured(ProviderId),

    #[error("{provider} request failed: {source:#}")]
    ProviderCallFailed {
        provider: ProviderId,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "{0} cannot be called directly from this client (cross-origin request rejected); \
         route requests through a backend proxy"
    )]
    ProviderUnsupportedInBrowser(ProviderId),

    #[error("conversation has not been started")]
    SessionNotStarted,
}

impl ConversationError {
    pub fn call_failed(provider: ProviderId, source: anyhow::Error) -> Self {
        ConversationError::ProviderCallFailed { provider, source }
    }
}

/// Capture failures that are surfaced to the user. Both switch listening off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("microphone access was denied")]
    PermissionDenied,
    #[error("no usable microphone was found")]
    DeviceUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_failure_message_includes_the_cause_chain() {
        let cause = anyhow::anyhow!("401 Unauthorized").context("Failed to reach OpenAI");
        let err = ConversationError::call_failed(ProviderId::OpenAi, cause);
        let message = err.to_string();
        assert!(message.starts_with("openai request failed"));
        assert!(message.contains("401 Unauthorized"));
    }

    #[test]
    fn cors_error_points_to_a_proxy() {
        let err = ConversationError::ProviderUnsupportedInBrowser(ProviderId::Anthropic);
        assert!(err.to_string().contains("backend proxy"));
    }
}
