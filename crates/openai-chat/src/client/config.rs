use super::consts;
use secrecy::SecretString;

pub struct Config {
    base_url: String,
    api_key: SecretString,
    transcription_model: String,
    transcription_language: String,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = SecretString::from(api_key.to_string());
        self
    }

    pub fn with_transcription_model(mut self, model: &str) -> Self {
        self.config.transcription_model = model.to_string();
        self
    }

    pub fn with_transcription_language(mut self, language: &str) -> Self {
        self.config.transcription_language = language.to_string();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Defaults, with the API key taken from `OPENAI_API_KEY` when present.
    pub fn new() -> Self {
        Self {
            base_url: consts::BASE_URL.to_string(),
            api_key: std::env::var(consts::OPENAI_API_KEY)
                .unwrap_or_default()
                .into(),
            transcription_model: consts::DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            transcription_language: consts::DEFAULT_TRANSCRIPTION_LANGUAGE.to_string(),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn transcription_model(&self) -> &str {
        &self.transcription_model
    }

    pub fn transcription_language(&self) -> &str {
        &self.transcription_language
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
