//! Application Configuration Module
//!
//! Settings for the interview service, loaded from environment variables
//! (and an optional `.env` file) into a single struct that is handed to the
//! components at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Length of one microphone segment sent for transcription.
pub const DEFAULT_SEGMENT_SECS: u64 = 4;

#[cfg(target_os = "macos")]
pub const DEFAULT_TTS_COMMAND: &str = "say";
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_TTS_COMMAND: &str = "espeak";

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub log_level: Level,
    pub prompts_dir: Option<PathBuf>,
    pub tts_command: String,
    pub input_device: Option<String>,
    pub segment_length: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `GOOGLE_API_KEY` (or `GEMINI_API_KEY`), `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`:
    //     credentials; a missing key only disables that provider.
    // *   `RUST_LOG`: (Optional) TRACE, DEBUG, INFO, WARN or ERROR. Defaults to "INFO".
    // *   `INTERVIEW_PROMPTS_DIR`: (Optional) directory of `*.md` prompt overrides.
    // *   `INTERVIEW_TTS_COMMAND`: (Optional) speech command, `say` on macOS, `espeak` elsewhere.
    // *   `INTERVIEW_INPUT_DEVICE`: (Optional) microphone name. Defaults to the system input.
    // *   `INTERVIEW_SEGMENT_SECS`: (Optional) seconds per transcribed segment. Defaults to 4.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let google_api_key = var("GOOGLE_API_KEY").or_else(|| var("GEMINI_API_KEY"));
        let openai_api_key = var("OPENAI_API_KEY");
        let anthropic_api_key = var("ANTHROPIC_API_KEY");

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        let segment_secs = match var("INTERVIEW_SEGMENT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "INTERVIEW_SEGMENT_SECS",
                        value,
                    });
                }
            },
            None => DEFAULT_SEGMENT_SECS,
        };

        Ok(Self {
            google_api_key,
            openai_api_key,
            anthropic_api_key,
            log_level,
            prompts_dir: var("INTERVIEW_PROMPTS_DIR").map(PathBuf::from),
            tts_command: var("INTERVIEW_TTS_COMMAND")
                .unwrap_or_else(|| DEFAULT_TTS_COMMAND.to_string()),
            input_device: var("INTERVIEW_INPUT_DEVICE"),
            segment_length: Duration::from_secs(segment_secs),
        })
    }
}
