//! Configuration loading with multi-layer merge

use super::Workflow;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level agent configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Executor defaults
    #[serde(default)]
    pub defaults: Defaults,

    /// Language-model gateway settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Permission grant storage
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

/// Executor timing defaults
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Delay between steps, lets the page settle
    #[serde(default = "default_step_delay")]
    pub step_delay_ms: u64,

    /// How long a target element stays highlighted
    #[serde(default = "default_highlight_duration")]
    pub highlight_duration_ms: u64,

    /// Duration of a wait step that does not set one
    #[serde(default = "default_wait_duration")]
    pub wait_duration_ms: u64,

    /// Upper bound on a single navigation
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
}

fn default_step_delay() -> u64 {
    500
}

fn default_highlight_duration() -> u64 {
    1000
}

fn default_wait_duration() -> u64 {
    1000
}

fn default_navigation_timeout() -> u64 {
    30
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay(),
            highlight_duration_ms: default_highlight_duration(),
            wait_duration_ms: default_wait_duration(),
            navigation_timeout_secs: default_navigation_timeout(),
        }
    }
}

impl Defaults {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn highlight_duration(&self) -> Duration {
        Duration::from_millis(self.highlight_duration_ms)
    }

    pub fn wait_duration(&self) -> Duration {
        Duration::from_millis(self.wait_duration_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

/// Model provider behind the HTTP gateway
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openai,
    Groq,
    Gemini,
    Azure,
    Local,
    /// Any OpenAI-compatible endpoint given by `endpoint`
    Custom,
}

/// Language-model gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    /// Base URL override (required for azure and custom)
    pub endpoint: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Model ID
    #[serde(default = "default_model")]
    pub model: String,

    /// Timeout in seconds for requests
    #[serde(default = "default_llm_timeout")]
    pub timeout: u64,

    /// Retries for transient transport failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_model() -> String {
    "gpt-4-turbo-preview".into()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            endpoint: None,
            api_key: None,
            model: default_model(),
            timeout: default_llm_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl LlmConfig {
    /// Returns true if enough is configured to reach a model
    pub fn is_configured(&self) -> bool {
        match self.provider {
            LlmProvider::Local => true,
            LlmProvider::Azure | LlmProvider::Custom => self.endpoint.is_some(),
            _ => self.api_key.is_some(),
        }
    }
}

/// Permission grant storage configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PermissionsConfig {
    /// SQLite file holding "always" grants; `~` is expanded
    pub grants_db: Option<String>,

    /// In interactive mode, confirm every step instead of only sensitive ones
    #[serde(default)]
    pub confirm_every_step: bool,
}

impl PermissionsConfig {
    /// Resolve the grants database path, falling back to the user config dir
    pub fn grants_db_path(&self) -> Option<PathBuf> {
        match self.grants_db {
            Some(ref path) => Some(PathBuf::from(shellexpand::tilde(path).into_owned())),
            None => dirs::config_dir().map(|p| p.join("webpilot/permissions.db")),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/webpilot/config.toml
    /// 3. .webpilot/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                config.merge(ConfigLayer::load(&user_config_path)?);
            }
        }

        let project_config_path = project_dir
            .map(|p| p.join(".webpilot/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".webpilot/config.toml"));

        if project_config_path.exists() {
            config.merge(ConfigLayer::load(&project_config_path)?);
        }

        Ok(config)
    }

    /// Load configuration from a specific file over the built-in defaults
    pub fn load_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge(ConfigLayer::load(path)?);
        Ok(config)
    }

    /// Get the user config path (~/.config/webpilot/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("webpilot/config.toml"))
    }

    /// Overlay a config layer; keys present in `layer` win
    pub fn merge(&mut self, layer: ConfigLayer) {
        if let Some(d) = layer.defaults {
            overlay(&mut self.defaults.step_delay_ms, d.step_delay_ms);
            overlay(&mut self.defaults.highlight_duration_ms, d.highlight_duration_ms);
            overlay(&mut self.defaults.wait_duration_ms, d.wait_duration_ms);
            overlay(&mut self.defaults.navigation_timeout_secs, d.navigation_timeout_secs);
        }

        if let Some(llm) = layer.llm {
            overlay(&mut self.llm.provider, llm.provider);
            if llm.endpoint.is_some() {
                self.llm.endpoint = llm.endpoint;
            }
            if llm.api_key.is_some() {
                self.llm.api_key = llm.api_key;
            }
            overlay(&mut self.llm.model, llm.model);
            overlay(&mut self.llm.timeout, llm.timeout);
            overlay(&mut self.llm.max_retries, llm.max_retries);
        }

        if let Some(permissions) = layer.permissions {
            if permissions.grants_db.is_some() {
                self.permissions.grants_db = permissions.grants_db;
            }
            overlay(
                &mut self.permissions.confirm_every_step,
                permissions.confirm_every_step,
            );
        }
    }
}

fn overlay<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

/// One config file as written: only the keys it sets are `Some`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub defaults: Option<DefaultsLayer>,
    pub llm: Option<LlmLayer>,
    pub permissions: Option<PermissionsLayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsLayer {
    pub step_delay_ms: Option<u64>,
    pub highlight_duration_ms: Option<u64>,
    pub wait_duration_ms: Option<u64>,
    pub navigation_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmLayer {
    pub provider: Option<LlmProvider>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout: Option<u64>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionsLayer {
    pub grants_db: Option<String>,
    pub confirm_every_step: Option<bool>,
}

impl ConfigLayer {
    /// Read one config file without filling in defaults
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Load a workflow definition from a TOML or JSON file
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
    let contents = std::fs::read_to_string(&expanded)
        .with_context(|| format!("reading {}", expanded.display()))?;

    let is_json = expanded
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let workflow: Workflow = if is_json {
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", expanded.display()))?
    } else {
        toml::from_str(&contents).with_context(|| format!("parsing {}", expanded.display()))?
    };

    Ok(workflow)
}
