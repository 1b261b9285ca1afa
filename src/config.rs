//! TOML configuration: rubric, engines, prompts and batch settings.
//!
//! ```toml
//! [rubric]
//! preset = "cash-plus-assets"
//! mode = "title_abstract"
//!
//! [[engines]]
//! id = "claude"
//! provider = "openrouter"
//! model = "anthropic/claude-3.5-haiku"
//! api_key = "${OPENROUTER_API_KEY}"
//!
//! [[engines]]
//! id = "gpt"
//! provider = "openrouter"
//! model = "openai/gpt-4o-mini"
//!
//! [batch]
//! concurrency = 4
//! paper_timeout_secs = 300
//! ```
//!
//! Custom rubrics replace `preset` with `[[rubric.criteria]]` tables
//! (`id`, `label`, `description`, `aliases`, `min_year`).

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assess::{PromptConfig, RetryPolicy};
use crate::batch::BatchConfig;
use crate::error::{Error, Result};
use crate::llm::{ClientConfig, Provider};
use crate::screening::{CriterionDef, Rubric, ScreeningMode};

/// Most engines a run can cross-check.
pub const MAX_ENGINES: usize = 2;

/// Complete screening configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreeningConfig {
    #[serde(default)]
    pub rubric: RubricConfig,
    #[serde(default)]
    pub engines: Vec<EngineConfig>,
    #[serde(default)]
    pub prompts: PromptConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl ScreeningConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let content = fs::read_to_string(&expanded)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", expanded, e)))?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", expanded, e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Build the rubric described by `[rubric]`.
    pub fn rubric(&self) -> Result<Rubric> {
        self.rubric.build()
    }

    /// Keep only the first `count` engines.
    pub fn select_engines(&mut self, count: usize) -> Result<()> {
        if count == 0 || count > self.engines.len() {
            return Err(Error::Config(format!(
                "requested {} engine(s) but {} configured",
                count,
                self.engines.len()
            )));
        }
        self.engines.truncate(count);
        Ok(())
    }

    /// Reject configurations no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        self.rubric()?;

        if self.engines.is_empty() || self.engines.len() > MAX_ENGINES {
            return Err(Error::Config(format!(
                "expected 1 or {} engines, found {}",
                MAX_ENGINES,
                self.engines.len()
            )));
        }

        let mut ids = HashSet::new();
        for engine in &self.engines {
            if engine.id.trim().is_empty() {
                return Err(Error::Config("engine id must not be empty".to_string()));
            }
            if !ids.insert(engine.id.as_str()) {
                return Err(Error::Config(format!("duplicate engine id '{}'", engine.id)));
            }
            if engine.model.trim().is_empty() {
                return Err(Error::Config(format!("engine '{}' has no model", engine.id)));
            }
        }

        if self.batch.concurrency == 0 {
            return Err(Error::Config("batch.concurrency must be at least 1".to_string()));
        }

        self.prompts.validate()
    }
}

/// `[rubric]` section: a preset name or inline criteria.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RubricConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub mode: ScreeningMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<CriterionDef>,
}

impl RubricConfig {
    pub fn preset(name: impl Into<String>) -> Self {
        Self {
            preset: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn build(&self) -> Result<Rubric> {
        match (&self.preset, self.criteria.is_empty()) {
            (Some(_), false) => Err(Error::Config(
                "rubric: set either `preset` or `criteria`, not both".to_string(),
            )),
            (Some(preset), true) => Rubric::preset(preset, self.mode),
            (None, _) => Rubric::new(
                self.name.clone().unwrap_or_else(|| "custom".to_string()),
                self.mode,
                self.criteria.clone(),
            ),
        }
    }
}

/// One `[[engines]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub id: String,
    pub provider: Provider,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Literal key or `${VAR}` reference; empty means the provider's usual variable.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Run a follow-up pass when the first pass is MAYBE.
    #[serde(default = "default_true")]
    pub followup: bool,
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    pub fn new(id: impl Into<String>, provider: Provider, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider,
            model: model.into(),
            base_url: None,
            api_key: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            followup: true,
        }
    }

    /// API key after `${VAR}` expansion.
    pub fn resolved_api_key(&self) -> Result<String> {
        let raw = if self.api_key.trim().is_empty() {
            format!("${{{}}}", key_variable(self.provider))
        } else {
            self.api_key.clone()
        };
        let key = shellexpand::env(&raw)
            .map_err(|e| Error::Config(format!("engine '{}': api_key: {}", self.id, e)))?
            .into_owned();
        if key.trim().is_empty() {
            return Err(Error::Config(format!("engine '{}' has an empty api_key", self.id)));
        }
        Ok(key)
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::new(self.resolved_api_key()?)
            .with_default_model(self.model.clone())
            .with_timeout(self.timeout_secs);
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.clone());
        }
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

fn key_variable(provider: Provider) -> &'static str {
    match provider {
        Provider::Anthropic => "ANTHROPIC_API_KEY",
        Provider::OpenAI => "OPENAI_API_KEY",
        Provider::OpenRouter => "OPENROUTER_API_KEY",
    }
}
