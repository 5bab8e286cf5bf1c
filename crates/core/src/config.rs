//! # Pipeline Configuration
//!
//! Settings for the Ollama connection, run output location, per-agent model
//! overrides and the streaming layer. Loaded from `.sdlc/config.json` when
//! present, then overridden from the environment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{AgentRole, ModelConfig, DEFAULT_BASE_URL};

/// Default location of the persisted settings file
pub const CONFIG_PATH: &str = ".sdlc/config.json";

/// Floor for the heartbeat interval
pub const MIN_HEARTBEAT_MS: u64 = 10;

/// Tuning for output coalescing and the SSE stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Flush once this much time has passed since the previous flush
    pub flush_interval_ms: u64,
    /// Flush once this many fragments are buffered
    pub flush_fragments: usize,
    /// Flush once this many characters are buffered, whatever the other limits say
    pub buffer_ceiling_chars: usize,
    /// `agent_output` keeps only this many trailing characters
    pub output_tail_chars: usize,
    /// `phase_complete` keeps only this many leading characters
    pub content_cap_chars: usize,
    /// Idle time before the stream emits a heartbeat
    pub heartbeat_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            flush_interval_ms: 250,
            flush_fragments: 4,
            buffer_ceiling_chars: 64 * 1024,
            output_tail_chars: 4000,
            content_cap_chars: 8000,
            heartbeat_ms: 120_000,
        }
    }
}

impl StreamSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Idle timeout of the event stream, at least [`MIN_HEARTBEAT_MS`]
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(MIN_HEARTBEAT_MS))
    }
}

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ollama server URL
    pub ollama_base_url: String,
    /// Root directory for per-run output folders
    pub output_dir: PathBuf,
    /// Per-call timeout; large local models are slow
    pub request_timeout_secs: u64,
    /// `num_predict` for every call
    pub max_tokens: u32,
    /// Review/revise rounds before the last review is accepted as-is
    pub review_max_iterations: u32,
    /// Model overrides (role key -> model tag)
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub per_agent_models: HashMap<String, String>,
    /// Temperature overrides (role key -> temperature)
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub per_agent_temperatures: HashMap<String, f32>,
    pub stream: StreamSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: DEFAULT_BASE_URL.to_string(),
            output_dir: PathBuf::from("sdlc_output"),
            request_timeout_secs: 600,
            max_tokens: 8192,
            review_max_iterations: 3,
            per_agent_models: HashMap::new(),
            per_agent_temperatures: HashMap::new(),
            stream: StreamSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from [`CONFIG_PATH`] and the environment
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_file(Path::new(CONFIG_PATH))?;
        config.apply_env();
        Ok(config)
    }

    /// Read a settings file; a missing file yields defaults
    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config: {:?}", path))
    }

    /// Apply `OLLAMA_BASE_URL`, `SDLC_OUTPUT_DIR` and `SDLC_REQUEST_TIMEOUT_SECS`
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("OLLAMA_BASE_URL").filter(|v| !v.is_empty()) {
            self.ollama_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(dir) = lookup("SDLC_OUTPUT_DIR").filter(|v| !v.is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("SDLC_REQUEST_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(_) => tracing::warn!(value = %secs, "Ignoring invalid SDLC_REQUEST_TIMEOUT_SECS"),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Model config for an agent: per-agent override, then the role default
    pub fn model_config(&self, role: AgentRole) -> ModelConfig {
        let model = self
            .per_agent_models
            .get(role.key())
            .cloned()
            .unwrap_or_else(|| role.default_model().to_string());
        let temperature = self
            .per_agent_temperatures
            .get(role.key())
            .copied()
            .unwrap_or_else(|| role.default_temperature());

        ModelConfig::new(model)
            .with_base_url(self.ollama_base_url.clone())
            .with_temperature(temperature)
            .with_max_tokens(self.max_tokens)
    }

    /// Distinct model tags across all roles, sorted
    pub fn required_models(&self) -> Vec<String> {
        let mut models: Vec<String> = AgentRole::all()
            .into_iter()
            .map(|role| self.model_config(role).model)
            .collect();
        models.sort();
        models.dedup();
        models
    }
}
