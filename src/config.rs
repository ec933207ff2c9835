//! Runtime configuration: `fabula.toml` plus environment variables.
//!
//! Secrets never live in the file. `OPENROUTER_API_KEY` and
//! `FABULA_INDEX_URL` come from the environment (a `.env` file is honored),
//! everything else from the config file with sensible defaults.

use crate::orchestrator::RunSettings;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "fabula.toml";
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Model choice for one agent role.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    output_dir: Option<PathBuf>,
    #[serde(default)]
    api_base_url: Option<String>,
    #[serde(default)]
    embedding_model: Option<String>,
    #[serde(default)]
    max_attempts: Option<u32>,
    #[serde(default)]
    stage_timeout_secs: Option<u64>,
    #[serde(default)]
    lore_top_k: Option<usize>,
    #[serde(default)]
    checkpoint_retention: Option<usize>,
    /// Per-role model table. Keys are stage names plus `default`, `craft`,
    /// and `consistency`.
    #[serde(default)]
    models: HashMap<String, ModelSettings>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub index_url: Option<String>,
    pub embedding_model: String,
    pub max_attempts: u32,
    pub stage_timeout: Duration,
    pub lore_top_k: usize,
    pub checkpoint_retention: usize,
    models: HashMap<String, ModelSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_file_config(FileConfig::default())
    }
}

impl Settings {
    /// Load settings: `.env`, then the config file (if present), then
    /// environment overrides for the secrets.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let file = if path.is_file() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("invalid config in {}", path.display()))?
        } else {
            FileConfig::default()
        };

        let mut settings = Self::from_file_config(file);
        settings.api_key = std::env::var("OPENROUTER_API_KEY").ok();
        settings.index_url = std::env::var("FABULA_INDEX_URL").ok();
        Ok(settings)
    }

    fn from_file_config(file: FileConfig) -> Self {
        let defaults = RunSettings::default();
        Self {
            output_dir: file.output_dir.unwrap_or_else(|| PathBuf::from("projects")),
            api_base_url: file
                .api_base_url
                .unwrap_or_else(|| crate::llm::openrouter::DEFAULT_BASE_URL.to_string()),
            api_key: None,
            index_url: None,
            embedding_model: file
                .embedding_model
                .unwrap_or_else(|| crate::llm::embeddings::DEFAULT_EMBEDDING_MODEL.to_string()),
            max_attempts: file.max_attempts.unwrap_or(defaults.max_attempts),
            stage_timeout: Duration::from_secs(
                file.stage_timeout_secs
                    .unwrap_or(defaults.stage_timeout.as_secs()),
            ),
            lore_top_k: file.lore_top_k.unwrap_or(defaults.lore_top_k),
            checkpoint_retention: file
                .checkpoint_retention
                .unwrap_or(crate::checkpoint::DEFAULT_RETENTION),
            models: file.models,
        }
    }

    /// Model settings for one role: the role's own entry, else `default`,
    /// else the built-in default.
    pub fn model_for(&self, role: &str) -> ModelSettings {
        self.models
            .get(role)
            .or_else(|| self.models.get("default"))
            .cloned()
            .unwrap_or_default()
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            max_attempts: self.max_attempts,
            stage_timeout: self.stage_timeout,
            lore_top_k: self.lore_top_k,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let settings = Settings::default();
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.output_dir, PathBuf::from("projects"));
        assert_eq!(settings.model_for("prose").model, DEFAULT_MODEL);
    }

    #[test]
    fn file_config_parses_per_role_models() {
        let raw = r#"
            output_dir = "out"
            max_attempts = 5

            [models]
            default = { model = "anthropic/claude-sonnet-4", temperature = 0.6 }
            prose = { model = "anthropic/claude-opus-4", temperature = 0.9 }
        "#;
        let file: FileConfig = toml::from_str(raw).unwrap();
        let settings = Settings::from_file_config(file);
        assert_eq!(settings.output_dir, PathBuf::from("out"));
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.model_for("prose").model, "anthropic/claude-opus-4");
        assert!((settings.model_for("prose").temperature - 0.9).abs() < f32::EPSILON);
        // unknown role falls back to the default entry
        assert_eq!(settings.model_for("beat").model, "anthropic/claude-sonnet-4");
        assert!((settings.model_for("beat").temperature - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn run_settings_mirror_file_values() {
        let file: FileConfig = toml::from_str("stage_timeout_secs = 30\nlore_top_k = 4").unwrap();
        let settings = Settings::from_file_config(file);
        let run = settings.run_settings();
        assert_eq!(run.stage_timeout, Duration::from_secs(30));
        assert_eq!(run.lore_top_k, 4);
    }
}
