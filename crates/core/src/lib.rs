//! Interview session runtime: a provider-agnostic streaming conversation,
//! continuous speech capture, interruptible playback, and the orchestrator
//! that ties them to a front end.

pub mod chat_api;
pub mod conversation;
pub mod error;
pub mod generic_types;
pub mod orchestrator;
pub mod prompts;
pub mod speech_capture;
pub mod utterance;

use generic_types::DisplayMessage;

/// Updates the orchestrator issues to the front end.
///
/// This enum decouples the interview logic from how (and where) the session
/// is rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A message the candidate sent.
    UserMessage(DisplayMessage),
    /// Cumulative text of the model reply being streamed.
    ModelPartial { id: u64, text: String },
    /// The completed model reply.
    ModelMessage(DisplayMessage),
    /// Not-yet-final speech, for transient display.
    Interim(String),
    /// The answer being composed changed.
    InputChanged(String),
    ListeningChanged(bool),
    /// A model turn is in flight.
    Processing(bool),
    /// Something the user should know about. The session continues.
    Alert(String),
    /// The interview is over, with the closing feedback.
    SessionComplete(String),
}
