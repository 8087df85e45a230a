use super::supervisor::SupervisorMsg;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::sync::mpsc;

/// One piece of recognized speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionFragment {
    pub text: String,
    /// Final fragments will not be revised; interim ones may still change.
    pub is_final: bool,
}

impl RecognitionFragment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Nothing was heard. Not an error from the user's point of view.
    TransientNoInput,
    /// The engine gave up on the stream by itself.
    Aborted,
    PermissionDenied,
    DeviceUnavailable,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Started,
    Results(Vec<RecognitionFragment>),
    Error(EngineErrorKind),
    /// The stream is over. Sent exactly once per started stream, after any
    /// error it reported.
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("recognition already started")]
    AlreadyStarted,
    #[error("failed to start recognition: {0}")]
    Failed(String),
}

/// Where an engine reports the events of one stream.
///
/// Every call to [`RecognitionEngine::start`] receives a new sink. Events sent
/// through the sink of a stream that has since been replaced are dropped by
/// the supervisor.
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    stream_id: u64,
    tx: mpsc::UnboundedSender<SupervisorMsg>,
}

impl EngineEventSink {
    pub(crate) fn new(stream_id: u64, tx: mpsc::UnboundedSender<SupervisorMsg>) -> Self {
        Self { stream_id, tx }
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// Returns `false` once the supervisor has shut down.
    pub fn send(&self, event: EngineEvent) -> bool {
        self.tx
            .send(SupervisorMsg::Engine {
                stream_id: self.stream_id,
                event,
            })
            .is_ok()
    }
}

/// A continuous, interim-capable speech recognizer.
///
/// Both calls must return promptly; the outcome of a stream is reported
/// asynchronously through the sink, from any thread.
#[cfg_attr(test, automock)]
pub trait RecognitionEngine: Send + 'static {
    fn start(&mut self, events: EngineEventSink) -> Result<(), StartError>;

    /// Asks the running stream to finish. The engine still reports
    /// [`EngineEvent::Ended`] when it has.
    fn stop(&mut self);
}
