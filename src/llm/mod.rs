//! The text-generation boundary.
//!
//! Everything above this module treats the model as an opaque
//! `prompt in, text out` service behind the [`TextGenerator`] trait. The
//! production implementation is [`openrouter::OpenRouterClient`]; tests use
//! scripted stubs. Models return prose-wrapped JSON more often than clean
//! JSON, so [`extract_json`] tolerates code fences and surrounding chatter.

pub mod embeddings;
pub mod openrouter;

pub use embeddings::OpenAiEmbeddings;
pub use openrouter::OpenRouterClient;

use crate::errors::GenerationError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Opaque text-generation service. One instance per agent role, carrying
/// its own model name and sampling settings.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<String, GenerationError>;
}

/// Pull a JSON value out of model output.
///
/// Accepts, in order of preference: a ```json fenced block, any fenced
/// block, or the first balanced `{...}` / `[...]` region in the raw text.
pub fn extract_json(text: &str) -> Result<serde_json::Value, GenerationError> {
    let candidate = fenced_block(text)
        .or_else(|| balanced_region(text))
        .unwrap_or(text)
        .trim();
    serde_json::from_str(candidate).map_err(|e| {
        GenerationError::MalformedOutput(format!(
            "no parseable JSON in model output: {e} (got: {})",
            truncate(candidate, 120)
        ))
    })
}

/// Extract and deserialize a typed payload from model output.
pub fn parse_payload<T: DeserializeOwned>(text: &str) -> Result<T, GenerationError> {
    let value = extract_json(text)?;
    serde_json::from_value(value)
        .map_err(|e| GenerationError::MalformedOutput(format!("unexpected payload shape: {e}")))
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // skip the language tag on the opening fence line
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

fn balanced_region(text: &str) -> Option<&str> {
    let open = text.find(['{', '['])?;
    let opener = text.as_bytes()[open] as char;
    let closer = if opener == '{' { '}' } else { ']' };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[open..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == opener => depth += 1,
            c if c == closer => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..open + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
