//! Continuous speech capture.
//!
//! Recognition engines end their streams whenever they like: after silence,
//! on network hiccups, or when the platform decides to. The supervisor keeps
//! capture running for as long as listening is wanted, restarting ended
//! streams after a short debounce and never letting two streams overlap.

mod engine;
mod supervisor;
mod transcript;

pub use engine::{
    EngineErrorKind, EngineEvent, EngineEventSink, RecognitionEngine, RecognitionFragment,
    StartError,
};
pub use supervisor::{CaptureOutput, CaptureState, RESTART_DEBOUNCE, SpeechCapture, StreamState};
pub use transcript::TranscriptBuffer;

#[cfg(test)]
pub(crate) use engine::MockRecognitionEngine;
