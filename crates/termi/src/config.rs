//! User configuration for termi
//!
//! Configuration file: ~/.config/termi/config.toml (or platform equivalent).
//! Precedence: file, then `OPENAI_*` environment, then command-line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use termi_llm::ModelConfig;

use crate::agent::{AgentConfig, AgentKind};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    /// Model endpoint and sampling
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent behavior
    #[serde(default)]
    pub agent: AgentSettings,

    /// REPL configuration
    #[serde(default)]
    pub repl: ReplConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// `shell` runs commands, `chat` only advises
    pub kind: AgentKind,
    pub max_tool_rounds: usize,
    pub tool_timeout_secs: u64,
    /// Capability output longer than this is truncated
    pub max_output_len: usize,
    pub show_thinking: bool,
    /// Committed messages replayed per request; unset replays everything
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_window: Option<usize>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            kind: AgentKind::Shell,
            max_tool_rounds: 8,
            tool_timeout_secs: 60,
            max_output_len: 20000,
            show_thinking: true,
            history_window: None,
        }
    }
}

impl AgentSettings {
    /// Loop configuration rooted at `working_dir`
    pub fn to_agent_config(&self, working_dir: PathBuf) -> AgentConfig {
        AgentConfig::default()
            .with_max_tool_rounds(self.max_tool_rounds)
            .with_tool_timeout(Duration::from_secs(self.tool_timeout_secs))
            .with_history_window(self.history_window)
            .with_max_output_len(self.max_output_len)
            .with_working_dir(working_dir)
    }
}

/// REPL-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplConfig {
    /// Lines starting with this go to the agent
    #[serde(default = "default_ai_prefix")]
    pub ai_prefix: String,

    /// Maximum line-editor history entries to keep
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_ai_prefix() -> String {
    "AI:".to_string()
}

fn default_history_size() -> usize {
    1000
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            ai_prefix: default_ai_prefix(),
            history_size: default_history_size(),
        }
    }
}

/// Command-line values that win over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub agent: Option<AgentKind>,
    pub max_tool_rounds: Option<usize>,
    pub tool_timeout_secs: Option<u64>,
    pub hide_thinking: bool,
}

impl UserConfig {
    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("termi").join("config.toml"))
    }

    /// Write the commented default configuration to the default location
    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path()?;
        Self::create_default_at(&path)?;
        Ok(path)
    }

    pub fn create_default_at(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        fs::write(path, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Apply `OPENAI_API_KEY` / `OPENAI_BASE_URL`, then the flags
    pub fn resolve(mut self, overrides: &Overrides) -> Self {
        self.model = self.model.with_env_overrides();
        self.apply(overrides);
        self
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(model) = &overrides.model {
            self.model.model = model.clone();
        }
        if let Some(url) = &overrides.base_url {
            self.model.base_url = url.clone();
        }
        if let Some(key) = &overrides.api_key {
            self.model.api_key = Some(key.clone());
        }
        if let Some(kind) = overrides.agent {
            self.agent.kind = kind;
        }
        if let Some(rounds) = overrides.max_tool_rounds {
            self.agent.max_tool_rounds = rounds;
        }
        if let Some(secs) = overrides.tool_timeout_secs {
            self.agent.tool_timeout_secs = secs;
        }
        if overrides.hide_thinking {
            self.agent.show_thinking = false;
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# termi configuration
# Location: ~/.config/termi/config.toml

[model]
# Any OpenAI-compatible endpoint. OPENAI_BASE_URL overrides this.
base_url = "https://api.openai.com/v1"

# Prefer the OPENAI_API_KEY environment variable over storing the key here
# api_key = "sk-..."

model = "deepseek-chat"
temperature = 0.7
max_tokens = 1000

# Seconds to wait for the response to start, and between stream events
connect_timeout_secs = 30
idle_timeout_secs = 120

[model.retry]
max_attempts = 3
initial_backoff_ms = 500
max_backoff_ms = 8000

[agent]
# "shell" runs commands, "chat" only advises
kind = "shell"

# Tool rounds allowed per request before termi stops the turn
max_tool_rounds = 8

# Seconds a single command may run
tool_timeout_secs = 60

# Command output longer than this (bytes) is truncated
max_output_len = 20000

# Show the model's <thinking> text
show_thinking = true

# Only replay the last N messages to the model
# history_window = 40

[repl]
# Lines starting with this prefix go to the AI, everything else to the shell
ai_prefix = "AI:"

# Maximum line-editor history entries to keep
history_size = 1000
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = UserConfig::default();
        assert_eq!(config.model.model, "deepseek-chat");
        assert_eq!(config.agent.kind, AgentKind::Shell);
        assert_eq!(config.agent.max_tool_rounds, 8);
        assert_eq!(config.repl.ai_prefix, "AI:");
        assert_eq!(config.repl.history_size, 1000);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[model]
model = "gpt-4o-mini"

[agent]
kind = "chat"
tool_timeout_secs = 5

[repl]
ai_prefix = "?"
"#;

        let config: UserConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.model.max_tokens, 1000);
        assert_eq!(config.agent.kind, AgentKind::Chat);
        assert_eq!(config.agent.tool_timeout_secs, 5);
        assert_eq!(config.agent.max_tool_rounds, 8);
        assert_eq!(config.repl.ai_prefix, "?");
    }

    #[test]
    fn test_default_template_parses_to_defaults() {
        let config: UserConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        let defaults = UserConfig::default();
        assert_eq!(config.model, defaults.model);
        assert_eq!(config.agent.max_tool_rounds, defaults.agent.max_tool_rounds);
        assert_eq!(config.agent.history_window, None);
        assert_eq!(config.repl.ai_prefix, defaults.repl.ai_prefix);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = UserConfig::load_from(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config.agent.tool_timeout_secs, 60);
    }

    #[test]
    fn test_create_default_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("termi").join("config.toml");

        UserConfig::create_default_at(&path).unwrap();
        assert!(path.exists());
        assert!(UserConfig::create_default_at(&path).is_err());

        let loaded = UserConfig::load_from(&path).unwrap();
        assert_eq!(loaded.model.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[agent]\nmax_tool_rounds = \"many\"\n").unwrap();

        let err = UserConfig::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config"));
    }

    #[test]
    fn test_overrides_win() {
        let mut config = UserConfig::default();
        config.apply(&Overrides {
            model: Some("local".into()),
            base_url: Some("http://localhost:8080/v1".into()),
            api_key: Some("k".into()),
            agent: Some(AgentKind::Chat),
            max_tool_rounds: Some(2),
            tool_timeout_secs: Some(3),
            hide_thinking: true,
        });

        assert_eq!(config.model.model, "local");
        assert_eq!(config.model.base_url, "http://localhost:8080/v1");
        assert_eq!(config.model.api_key.as_deref(), Some("k"));
        assert_eq!(config.agent.kind, AgentKind::Chat);
        assert_eq!(config.agent.max_tool_rounds, 2);
        assert_eq!(config.agent.tool_timeout_secs, 3);
        assert!(!config.agent.show_thinking);
    }

    #[test]
    fn test_agent_config_from_settings() {
        let settings = AgentSettings {
            tool_timeout_secs: 7,
            history_window: Some(12),
            ..AgentSettings::default()
        };
        let config = settings.to_agent_config(PathBuf::from("/work"));
        assert_eq!(config.tool_timeout, Duration::from_secs(7));
        assert_eq!(config.history_window, Some(12));
        assert_eq!(config.working_dir, PathBuf::from("/work"));
    }
}
