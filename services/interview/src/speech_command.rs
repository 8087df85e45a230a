use anyhow::{Context, Result};
use async_trait::async_trait;
use interview_core::utterance::SynthesisEngine;
use std::process::Stdio;
use tokio::process::Command;

/// Speaks through a local text-to-speech program such as `say` or `espeak`.
/// The text is passed as the last argument; cancelling the utterance kills
/// the process.
#[derive(Debug, Clone)]
pub struct SpeechCommand {
    program: String,
    args: Vec<String>,
}

impl SpeechCommand {
    /// Parses a whitespace-separated command line, e.g. `espeak -s 160`.
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let program = words.next().context("Speech command is empty")?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl SynthesisEngine for SpeechCommand {
    async fn speak(&self, text: String) -> Result<()> {
        tracing::debug!(program = %self.program, chars = text.len(), "speaking");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to run speech command {:?}", self.program))?;

        if !status.success() {
            anyhow::bail!("Speech command {:?} exited with {}", self.program, status);
        }
        Ok(())
    }
}
