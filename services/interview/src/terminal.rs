//! Line-oriented terminal front end: parses what the candidate types and
//! prints the orchestrator's updates as a running transcript.

use interview_core::Command;
use interview_core::generic_types::DisplayMessage;
use std::io::{self, Write};

pub const HELP: &str = "\
Type an answer and press Enter to send it.
  /mic    start or stop the microphone
  /send   send what the microphone has picked up
  /tts    switch spoken replies on or off
  /clear  discard the answer being composed
  /end    finish the interview
  /help   show this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Typed text, sent together with anything already composed.
    Answer(String),
    ToggleMic,
    Send,
    ToggleTts,
    Clear,
    End,
    Help,
    Unknown(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(command) = line.strip_prefix('/') else {
            return Input::Answer(line.to_string());
        };
        match command.to_ascii_lowercase().as_str() {
            "mic" => Input::ToggleMic,
            "send" => Input::Send,
            "tts" => Input::ToggleTts,
            "clear" => Input::Clear,
            "end" | "quit" => Input::End,
            "help" | "?" => Input::Help,
            _ => Input::Unknown(line.to_string()),
        }
    }
}

/// Writes the interview transcript. Streamed replies are printed
/// incrementally on one line.
pub struct TranscriptPrinter<W: Write> {
    out: W,
    // The streamed reply as far as it is on screen.
    shown: String,
}

impl<W: Write> TranscriptPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            shown: String::new(),
        }
    }

    pub fn apply(&mut self, command: &Command) -> io::Result<()> {
        match command {
            Command::UserMessage(message) => self.message("You", message)?,
            Command::ModelPartial { text, .. } => self.partial(text)?,
            Command::ModelMessage(message) => {
                if self.shown.is_empty() {
                    self.message("Interviewer", message)?;
                } else {
                    self.partial(&message.text)?;
                    self.break_line()?;
                }
            }
            Command::Interim(text) if !text.is_empty() => writeln!(self.out, "  ... {text}")?,
            Command::Interim(_) => {}
            Command::InputChanged(text) if !text.is_empty() => writeln!(self.out, "  > {text}")?,
            Command::InputChanged(_) => {}
            Command::ListeningChanged(on) => {
                let state = if *on { "listening" } else { "stopped" };
                writeln!(self.out, "-- microphone {state}")?;
            }
            Command::Processing(busy) => tracing::debug!(busy, "model turn"),
            Command::Alert(text) => {
                self.break_line()?;
                writeln!(self.out, "!! {text}")?;
            }
            Command::SessionComplete(feedback) => {
                self.break_line()?;
                writeln!(self.out, "\n=== Interview complete ===\n{feedback}")?;
            }
        }
        self.out.flush()
    }

    fn message(&mut self, who: &str, message: &DisplayMessage) -> io::Result<()> {
        writeln!(
            self.out,
            "[{}] {}: {}",
            message.timestamp.format("%H:%M:%S"),
            who,
            message.text
        )
    }

    fn partial(&mut self, text: &str) -> io::Result<()> {
        if self.shown.is_empty() {
            write!(self.out, "Interviewer: ")?;
        }
        match text.strip_prefix(self.shown.as_str()) {
            Some(rest) => write!(self.out, "{rest}")?,
            // Not an extension of what is on screen; start over.
            None => write!(self.out, "\nInterviewer: {text}")?,
        }
        self.shown = text.to_string();
        Ok(())
    }

    // Ends a streamed line that was cut short by an error.
    fn break_line(&mut self) -> io::Result<()> {
        if !self.shown.is_empty() {
            writeln!(self.out)?;
            self.shown.clear();
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::generic_types::TurnRole;

    fn model_message(text: &str) -> Command {
        Command::ModelMessage(DisplayMessage {
            id: 1,
            role: TurnRole::Model,
            text: text.to_string(),
            timestamp: chrono::Local::now(),
        })
    }

    fn partial(text: &str) -> Command {
        Command::ModelPartial {
            id: 1,
            text: text.to_string(),
        }
    }

    fn printed(commands: &[Command]) -> io::Result<String> {
        let mut printer = TranscriptPrinter::new(Vec::new());
        for command in commands {
            printer.apply(command)?;
        }
        Ok(String::from_utf8_lossy(&printer.into_inner()).into_owned())
    }

    #[test]
    fn test_input_parsing() {
        assert_eq!(Input::parse(" I used Rust \n"), Input::Answer("I used Rust".to_string()));
        assert_eq!(Input::parse("/MIC"), Input::ToggleMic);
        assert_eq!(Input::parse("/send"), Input::Send);
        assert_eq!(Input::parse("/tts"), Input::ToggleTts);
        assert_eq!(Input::parse("/clear"), Input::Clear);
        assert_eq!(Input::parse("/quit"), Input::End);
        assert_eq!(Input::parse("/dance"), Input::Unknown("/dance".to_string()));
        assert_eq!(Input::parse(""), Input::Answer(String::new()));
    }

    #[test]
    fn test_streamed_reply_is_printed_incrementally() -> io::Result<()> {
        let out = printed(&[
            partial("Hi"),
            partial("Hi there"),
            partial("Hi there!"),
            model_message("Hi there!"),
        ])?;
        assert_eq!(out, "Interviewer: Hi there!\n");
        Ok(())
    }

    #[test]
    fn test_dropped_partials_do_not_lose_text() -> io::Result<()> {
        let out = printed(&[partial("Tell"), model_message("Tell me more.")])?;
        assert_eq!(out, "Interviewer: Tell me more.\n");
        Ok(())
    }

    #[test]
    fn test_alert_breaks_a_streamed_line() -> io::Result<()> {
        let out = printed(&[partial("Hel"), Command::Alert("google request failed".to_string())])?;
        assert_eq!(out, "Interviewer: Hel\n!! google request failed\n");
        Ok(())
    }
}
