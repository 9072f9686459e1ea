use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Name of the prompt file (without `.md`) used as the session's system instruction.
pub const SYSTEM_PROMPT: &str = "system";

pub fn load_prompts(dir_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem for prompt file")?
                .to_string();

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

            prompts.insert(prompt_key, content);
        }
    }

    Ok(prompts)
}

/// Replaces each `{name}` placeholder with its value. Unknown placeholders are left alone.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |text, (name, value)| {
        text.replace(&format!("{{{}}}", name), value)
    })
}

/// The system instruction for a session in `language`.
pub fn system_instruction(prompts: &HashMap<String, String>, language: &str) -> Result<String> {
    let template = prompts
        .get(SYSTEM_PROMPT)
        .with_context(|| format!("Missing prompt file: {}.md", SYSTEM_PROMPT))?;
    Ok(fill(template.trim(), &[("language", language)]))
}
