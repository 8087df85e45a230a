use crate::Command;
use crate::conversation::ConversationSession;
use crate::error::ConversationError;
use crate::generic_types::{DisplayMessage, SessionConfig, TurnRole};
use crate::speech_capture::{CaptureOutput, CaptureState, SpeechCapture, TranscriptBuffer};
use crate::utterance::UtterancePlayer;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// The hidden first user turn that makes the interviewer open the session.
pub const GREETING_TURN: &str = "Hello, I am ready for the interview. [Time: 0:00]";

/// Formats elapsed interview time as `MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Wires candidate input, typed or spoken, to the conversation and the
/// model's replies to the display and the speaker.
pub struct InterviewOrchestrator {
    conversation: ConversationSession,
    capture: Option<SpeechCapture>,
    player: Option<UtterancePlayer>,
    commands: mpsc::Sender<Command>,
    input: TranscriptBuffer,
    listening: bool,
    tts_enabled: bool,
    started_at: Instant,
    next_message_id: u64,
}

impl InterviewOrchestrator {
    pub fn new(conversation: ConversationSession, commands: mpsc::Sender<Command>) -> Self {
        Self {
            conversation,
            capture: None,
            player: None,
            commands,
            input: TranscriptBuffer::new(),
            listening: false,
            tts_enabled: false,
            started_at: Instant::now(),
            next_message_id: 1,
        }
    }

    pub fn with_capture(mut self, capture: SpeechCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Replies are spoken through `player` while text-to-speech is enabled.
    pub fn with_player(mut self, player: UtterancePlayer) -> Self {
        self.player = Some(player);
        self.tts_enabled = true;
        self
    }

    pub fn with_tts(mut self, enabled: bool) -> Self {
        self.tts_enabled = enabled && self.player.is_some();
        self
    }

    /// Starts the conversation and lets the interviewer open it.
    pub async fn begin(&mut self, config: SessionConfig) -> Result<(), ConversationError> {
        self.conversation.start(config)?;
        self.started_at = Instant::now();
        self.model_turn(GREETING_TURN).await.map(|_| ())
    }

    /// Sends one answer. The model sees it with the elapsed interview time
    /// appended; the display shows it as typed.
    ///
    /// Returns the model reply, or `None` when `text` was blank.
    pub async fn submit(&mut self, text: &str) -> Result<Option<String>, ConversationError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if self.listening {
            self.set_listening(false).await;
        }

        let message = self.display(TurnRole::User, text);
        self.send(Command::UserMessage(message)).await;

        let annotated = format!("{} [Time: {}]", text, format_elapsed(self.elapsed()));
        self.model_turn(&annotated).await.map(Some)
    }

    /// Submits the composed answer, typed and spoken parts alike.
    pub async fn submit_input(&mut self) -> Result<Option<String>, ConversationError> {
        let text = self.input.take();
        self.send(Command::InputChanged(String::new())).await;
        self.submit(&text).await
    }

    /// Appends typed text to the answer being composed.
    pub async fn append_input(&mut self, text: &str) {
        self.input.push_final(text);
        self.send(Command::InputChanged(self.input.as_str().to_string()))
            .await;
    }

    pub async fn clear_input(&mut self) {
        self.input.clear();
        self.send(Command::InputChanged(String::new())).await;
    }

    pub async fn toggle_listening(&mut self) {
        let on = !self.listening;
        self.set_listening(on).await;
    }

    pub fn toggle_tts(&mut self) -> bool {
        if self.player.is_none() {
            return false;
        }
        self.tts_enabled = !self.tts_enabled;
        if !self.tts_enabled {
            self.cancel_playback();
        }
        self.tts_enabled
    }

    /// Applies one output of the speech capture supervisor.
    pub async fn handle_capture(&mut self, output: CaptureOutput) {
        match output {
            CaptureOutput::Interim(text) => self.send(Command::Interim(text)).await,
            CaptureOutput::Final(text) => {
                self.input.push_final(&text);
                self.send(Command::InputChanged(self.input.as_str().to_string()))
                    .await;
            }
            CaptureOutput::ListeningChanged(on) => {
                if self.listening != on {
                    self.listening = on;
                    self.send(Command::ListeningChanged(on)).await;
                }
            }
            CaptureOutput::Fatal(error) => {
                self.send(Command::Alert(error.to_string())).await;
            }
        }
    }

    /// Ends the interview: stops playback and capture, then publishes the
    /// closing feedback.
    pub async fn end(&mut self) -> String {
        self.cancel_playback();
        if let Some(capture) = self.capture.take() {
            capture.shutdown().await;
        }
        if self.listening {
            self.listening = false;
            self.send(Command::ListeningChanged(false)).await;
        }

        tracing::info!(
            turns = self.conversation.turns().len(),
            elapsed = %format_elapsed(self.elapsed()),
            "interview ended"
        );
        let feedback = self.conversation.prompts().feedback().to_string();
        self.send(Command::SessionComplete(feedback.clone())).await;
        feedback
    }

    pub fn conversation(&self) -> &ConversationSession {
        &self.conversation
    }

    pub fn input(&self) -> &str {
        self.input.as_str()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn tts_enabled(&self) -> bool {
        self.tts_enabled
    }

    pub fn is_speaking(&self) -> bool {
        self.player.as_ref().is_some_and(UtterancePlayer::is_speaking)
    }

    pub fn capture_state(&self) -> Option<CaptureState> {
        self.capture.as_ref().map(SpeechCapture::state)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    async fn set_listening(&mut self, on: bool) {
        let Some(capture) = &self.capture else {
            self.send(Command::Alert(
                "Speech recognition is not available on this system.".to_string(),
            ))
            .await;
            return;
        };

        if on {
            // Never record the interviewer's own voice.
            if let Some(player) = self.player.as_mut() {
                player.cancel();
            }
        }
        capture.set_listening(on);
        if self.listening != on {
            self.listening = on;
            self.send(Command::ListeningChanged(on)).await;
        }
    }

    async fn model_turn(&mut self, text: &str) -> Result<String, ConversationError> {
        let id = self.next_id();
        let commands = self.commands.clone();
        self.send(Command::Processing(true)).await;

        let result = self
            .conversation
            .send_turn(text, |partial| {
                let update = Command::ModelPartial {
                    id,
                    text: partial.to_string(),
                };
                if commands.try_send(update).is_err() {
                    tracing::debug!(message = id, "display is behind, partial update dropped");
                }
            })
            .await;

        self.send(Command::Processing(false)).await;
        match result {
            Ok(reply) => {
                let message = DisplayMessage {
                    id,
                    role: TurnRole::Model,
                    text: reply.clone(),
                    timestamp: chrono::Local::now(),
                };
                self.send(Command::ModelMessage(message)).await;
                if self.tts_enabled {
                    if let Some(player) = self.player.as_mut() {
                        player.speak(&reply);
                    }
                }
                Ok(reply)
            }
            Err(e) => {
                tracing::error!("model turn failed: {}", e);
                self.send(Command::Alert(e.to_string())).await;
                Err(e)
            }
        }
    }

    fn cancel_playback(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.cancel();
        }
    }

    fn display(&mut self, role: TurnRole, text: &str) -> DisplayMessage {
        DisplayMessage {
            id: self.next_id(),
            role,
            text: text.to_string(),
            timestamp: chrono::Local::now(),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }

    async fn send(&mut self, command: Command) {
        if self.commands.send(command).await.is_err() {
            tracing::debug!("front end is gone, command dropped");
        }
    }
}
