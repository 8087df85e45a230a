use anyhow::{Context, Result};
use interview_core::prompts::PromptBook;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Reads every `*.md` file in `dir_path` as a template keyed by its file
/// stem. Blank files are skipped so they cannot wipe out a built-in template.
pub fn load_overrides(dir_path: &Path) -> Result<HashMap<String, String>> {
    let mut overrides = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Could not get file stem for prompt file")?
            .to_string();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

        if content.trim().is_empty() {
            tracing::warn!(template = %name, "ignoring empty prompt file");
            continue;
        }
        overrides.insert(name, content);
    }

    Ok(overrides)
}

/// The built-in prompt book, with templates from `dir` layered on top.
pub fn prompt_book(dir: Option<&Path>) -> Result<PromptBook> {
    let book = PromptBook::builtin();
    let Some(dir) = dir else {
        return Ok(book);
    };

    let overrides = load_overrides(dir)?;
    for name in overrides.keys() {
        if book.template(name).is_none() {
            tracing::warn!(template = %name, "prompt file does not match any template");
        }
    }
    tracing::info!("Loaded {} prompt overrides from {}", overrides.len(), dir.display());
    Ok(book.with_overrides(overrides))
}
