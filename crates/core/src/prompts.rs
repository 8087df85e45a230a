use crate::generic_types::{PromptStyle, SessionConfig};
use std::collections::HashMap;

pub const FEEDBACK_TEMPLATE: &str = "feedback";

const BUILTIN: [(&str, &str); 3] = [
    ("technical", include_str!("../prompts/technical.md")),
    ("behavioral", include_str!("../prompts/behavioral.md")),
    (FEEDBACK_TEMPLATE, include_str!("../prompts/feedback.md")),
];

/// Named prompt templates. Interview templates may use the `{role}`,
/// `{topic}` and `{candidate}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptBook {
    templates: HashMap<String, String>,
}

impl Default for PromptBook {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptBook {
    pub fn builtin() -> Self {
        let templates = BUILTIN
            .iter()
            .map(|(name, text)| (name.to_string(), text.trim().to_string()))
            .collect();
        Self { templates }
    }

    /// Replaces built-in templates with same-named entries of `overrides`.
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        for (name, text) in overrides {
            tracing::debug!(template = %name, "prompt template overridden");
            self.templates.insert(name, text.trim().to_string());
        }
        self
    }

    pub fn template(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// The system instruction for an interview configured by `config`.
    pub fn system_instruction(&self, config: &SessionConfig) -> String {
        let template = self.template(config.style.template_name()).unwrap_or_default();
        render(template, config)
    }

    /// Closing summary shown when the interview ends.
    pub fn feedback(&self) -> &str {
        self.template(FEEDBACK_TEMPLATE).unwrap_or_default()
    }

    pub fn style_template(&self, style: PromptStyle) -> Option<&str> {
        self.template(style.template_name())
    }
}

// Substituted values are copied verbatim, never scanned for placeholders.
fn render(template: &str, config: &SessionConfig) -> String {
    let placeholders = [
        ("{role}", config.role.as_str()),
        ("{topic}", config.topic.as_str()),
        ("{candidate}", config.candidate_name.as_str()),
    ];

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let tail = &rest[open..];
        match placeholders.iter().find(|(name, _)| tail.starts_with(name)) {
            Some((name, value)) => {
                rendered.push_str(value);
                rest = &tail[name.len()..];
            }
            None => {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
    }
    rendered.push_str(rest);
    rendered
}
