use crate::error::ConversationError;
use crate::generic_types::{ConversationTurn, ModelId, ProviderId};
use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
#[cfg(test)]
use mockall::automock;
use std::pin::Pin;

/// Cumulative text of one model reply. Every item contains all text received
/// so far for the turn; the last item is the complete reply.
pub type SnapshotStream<'a> =
    Pin<Box<dyn Stream<Item = Result<String, ConversationError>> + Send + 'a>>;

/// One vendor backend behind a single streaming-turn interface.
///
/// The conversation layer selects an implementation through the model's
/// provider and never looks at vendor-specific state.
#[cfg_attr(test, automock)]
pub trait ChatProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Allocates fresh conversation state for `model`.
    ///
    /// Fails with [`ConversationError::ProviderNotConfigured`] when no
    /// credential is available.
    fn init(
        &self,
        model: ModelId,
        system_instruction: &str,
    ) -> Result<Box<dyn ChatHandle>, ConversationError>;
}

/// Provider-specific state of one conversation.
pub trait ChatHandle: Send {
    /// Sends `user_text` and streams the reply as cumulative snapshots.
    ///
    /// The user turn becomes part of the replay state before the request is
    /// issued; the model turn only once the stream has completed. If the call
    /// fails, or the stream is dropped early, the replay state is left exactly
    /// as it was before the call.
    fn stream<'a>(&'a mut self, user_text: &'a str) -> SnapshotStream<'a>;

    /// The turns this handle will replay on the next call, oldest first.
    fn replay_turns(&self) -> Vec<ConversationTurn>;
}

/// One-shot speech-to-text for a complete audio clip.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes a WAV encoded clip.
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String>;
}
