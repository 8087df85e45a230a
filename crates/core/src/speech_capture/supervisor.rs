use super::engine::{EngineErrorKind, EngineEvent, EngineEventSink, RecognitionEngine, StartError};
use crate::error::CaptureError;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Delay between an unexpected end of stream and the restart it triggers.
pub const RESTART_DEBOUNCE: Duration = Duration::from_millis(300);

const OUTPUT_CAPACITY: usize = 64;

#[derive(Debug)]
pub(crate) enum SupervisorMsg {
    SetListening(bool),
    Engine { stream_id: u64, event: EngineEvent },
    RestartDue { generation: u64 },
    Shutdown,
}

/// What the engine is actually doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Stopped,
    Running,
    /// Stop was requested; waiting for the engine to report the end.
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureState {
    /// Whether capture is wanted.
    pub listening: bool,
    pub stream: StreamState,
    pub restart_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutput {
    /// Not-yet-final text, for transient display only. Empty clears it.
    Interim(String),
    /// Finalized text to append to the answer being composed.
    Final(String),
    Fatal(CaptureError),
    ListeningChanged(bool),
}

/// Handle to the capture supervisor task.
///
/// Dropping the handle tears the supervisor down.
pub struct SpeechCapture {
    tx: mpsc::UnboundedSender<SupervisorMsg>,
    state: watch::Receiver<CaptureState>,
    task: Option<JoinHandle<()>>,
}

impl SpeechCapture {
    /// Spawns the supervisor on the current tokio runtime. Capture starts
    /// switched off.
    pub fn spawn<E: RecognitionEngine>(engine: E) -> (Self, mpsc::Receiver<CaptureOutput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CAPACITY);
        let initial = CaptureState {
            listening: false,
            stream: StreamState::Stopped,
            restart_pending: false,
        };
        let (state_tx, state_rx) = watch::channel(initial);

        let supervisor = Supervisor {
            engine,
            tx: tx.clone(),
            output: output_tx,
            state: state_tx,
            desired: false,
            actual: StreamState::Stopped,
            current_stream: 0,
            next_stream: 1,
            last_ended: None,
            abort_pending: false,
            restart: RestartSlot::default(),
        };
        let task = tokio::spawn(supervisor.run(rx));

        let handle = Self {
            tx,
            state: state_rx,
            task: Some(task),
        };
        (handle, output_rx)
    }

    pub fn set_listening(&self, on: bool) {
        if self.tx.send(SupervisorMsg::SetListening(on)).is_err() {
            tracing::warn!("speech capture supervisor is gone");
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state.clone()
    }

    /// Stops capture regardless of the listening flag and waits for the
    /// supervisor to exit. No timers outlive this call.
    pub async fn shutdown(mut self) {
        let _ = self.tx.send(SupervisorMsg::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("speech capture supervisor failed: {}", e);
            }
        }
    }
}

impl Drop for SpeechCapture {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.tx.send(SupervisorMsg::Shutdown);
        }
    }
}

// Holds at most one scheduled restart. Scheduling again replaces it.
#[derive(Default)]
struct RestartSlot {
    generation: u64,
    pending: Option<(u64, JoinHandle<()>)>,
}

impl RestartSlot {
    fn schedule(&mut self, tx: &mpsc::UnboundedSender<SupervisorMsg>) {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let tx = tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(RESTART_DEBOUNCE).await;
            let _ = tx.send(SupervisorMsg::RestartDue { generation });
        });
        self.pending = Some((generation, timer));
    }

    fn cancel(&mut self) {
        if let Some((_, timer)) = self.pending.take() {
            timer.abort();
        }
    }

    /// Consumes the pending restart if `generation` is the current one.
    fn fire(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some((pending, _)) if *pending == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

struct Supervisor<E> {
    engine: E,
    tx: mpsc::UnboundedSender<SupervisorMsg>,
    output: mpsc::Sender<CaptureOutput>,
    state: watch::Sender<CaptureState>,
    desired: bool,
    actual: StreamState,
    current_stream: u64,
    next_stream: u64,
    last_ended: Option<u64>,
    // The next end of stream was asked for (or the engine aborted) and must
    // not trigger a restart.
    abort_pending: bool,
    restart: RestartSlot,
}

impl<E: RecognitionEngine> Supervisor<E> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SupervisorMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                SupervisorMsg::SetListening(on) => self.set_listening(on).await,
                SupervisorMsg::Engine { stream_id, event } => {
                    if stream_id != self.current_stream {
                        tracing::debug!(stream_id, ?event, "ignoring event from stale stream");
                        continue;
                    }
                    self.on_engine_event(event).await;
                }
                SupervisorMsg::RestartDue { generation } => {
                    let due = self.restart.fire(generation);
                    if due && self.desired && self.actual == StreamState::Stopped {
                        tracing::debug!("restarting recognition");
                        self.start_stream().await;
                    }
                }
                SupervisorMsg::Shutdown => break,
            }
            self.publish();
        }
        self.teardown();
    }

    async fn set_listening(&mut self, on: bool) {
        if on {
            self.set_desired(true).await;
            match self.actual {
                StreamState::Running => {}
                // Started as soon as the engine reports the end.
                StreamState::Stopping => {}
                StreamState::Stopped => {
                    self.restart.cancel();
                    self.start_stream().await;
                }
            }
        } else {
            self.set_desired(false).await;
            self.restart.cancel();
            if self.actual == StreamState::Running {
                self.abort_pending = true;
                self.actual = StreamState::Stopping;
                self.engine.stop();
            }
        }
    }

    async fn start_stream(&mut self) {
        let previous = self.current_stream;
        let stream_id = self.next_stream;
        self.next_stream += 1;
        self.current_stream = stream_id;
        self.abort_pending = false;

        let sink = EngineEventSink::new(stream_id, self.tx.clone());
        match self.engine.start(sink) {
            Ok(()) => {
                tracing::debug!(stream_id, "recognition stream started");
                self.actual = StreamState::Running;
            }
            // The engine is still winding down the stream that just ended.
            Err(StartError::AlreadyStarted) if self.last_ended == Some(previous) => {
                tracing::debug!(stream_id, "recognition still stopping, retrying");
                self.current_stream = previous;
                self.actual = StreamState::Stopped;
                self.restart.schedule(&self.tx);
            }
            // Keep listening to the stream the engine is actually running.
            Err(StartError::AlreadyStarted) => {
                tracing::debug!(stream = previous, "recognition was already running");
                self.current_stream = previous;
                self.actual = StreamState::Running;
            }
            Err(e) => {
                tracing::error!(stream_id, "{}", e);
                self.actual = StreamState::Stopped;
                self.set_desired(false).await;
            }
        }
    }

    async fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Started => tracing::debug!(stream = self.current_stream, "engine started"),
            EngineEvent::Results(fragments) => {
                let mut interim = String::new();
                for fragment in fragments {
                    if fragment.is_final {
                        self.emit(CaptureOutput::Final(fragment.text)).await;
                    } else {
                        interim.push_str(&fragment.text);
                    }
                }
                self.emit_interim(interim);
            }
            EngineEvent::Error(kind) => self.on_engine_error(kind).await,
            EngineEvent::Ended => self.on_ended().await,
        }
    }

    async fn on_engine_error(&mut self, kind: EngineErrorKind) {
        match kind {
            EngineErrorKind::TransientNoInput => {}
            EngineErrorKind::Aborted => {
                tracing::debug!(stream = self.current_stream, "recognition aborted");
                self.abort_pending = true;
                self.restart.cancel();
                self.set_desired(false).await;
            }
            EngineErrorKind::PermissionDenied | EngineErrorKind::DeviceUnavailable => {
                let error = if kind == EngineErrorKind::PermissionDenied {
                    CaptureError::PermissionDenied
                } else {
                    CaptureError::DeviceUnavailable
                };
                tracing::error!(stream = self.current_stream, "{}", error);
                self.abort_pending = true;
                self.restart.cancel();
                self.set_desired(false).await;
                self.emit(CaptureOutput::Fatal(error)).await;
            }
            EngineErrorKind::Other(message) => {
                tracing::warn!(stream = self.current_stream, "recognition error: {}", message);
            }
        }
    }

    async fn on_ended(&mut self) {
        let was = self.actual;
        self.actual = StreamState::Stopped;
        self.last_ended = Some(self.current_stream);
        tracing::debug!(stream = self.current_stream, ?was, "recognition stream ended");

        if std::mem::take(&mut self.abort_pending) {
            // Listening was switched back on while the old stream wound down.
            if self.desired {
                self.start_stream().await;
            }
            return;
        }
        if self.desired {
            self.restart.schedule(&self.tx);
        }
    }

    async fn set_desired(&mut self, on: bool) {
        if self.desired != on {
            self.desired = on;
            self.emit(CaptureOutput::ListeningChanged(on)).await;
        }
    }

    async fn emit(&mut self, output: CaptureOutput) {
        if self.output.send(output).await.is_err() {
            tracing::debug!("capture output receiver dropped");
        }
    }

    // Interim text is superseded by the next result, so it is dropped rather
    // than waited on when the reader lags.
    fn emit_interim(&self, text: String) {
        if let Err(mpsc::error::TrySendError::Full(_)) =
            self.output.try_send(CaptureOutput::Interim(text))
        {
            tracing::debug!("capture output full, interim text dropped");
        }
    }

    fn publish(&self) {
        self.state.send_replace(CaptureState {
            listening: self.desired,
            stream: self.actual,
            restart_pending: self.restart.is_pending(),
        });
    }

    fn teardown(&mut self) {
        self.restart.cancel();
        if self.actual != StreamState::Stopped {
            self.engine.stop();
        }
        self.actual = StreamState::Stopped;
        self.desired = false;
        self.publish();
        tracing::debug!("speech capture supervisor stopped");
    }
}
