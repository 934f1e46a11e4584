//! `ctxguard.toml` loading and discovery.
//!
//! Configuration is looked up in this order, first hit wins:
//! 1. `--config <path>`
//! 2. `$CTXGUARD_CONFIG`
//! 3. `.ctxguard/ctxguard.toml` in the working directory
//! 4. `<config dir>/ctxguard/ctxguard.toml`
//!
//! The `[compaction]` section is required. `[model]` and `[logging]` fall
//! back to defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::compaction::CompactionConfig;
use crate::errors::ConfigurationError;

pub const CONFIG_ENV_VAR: &str = "CTXGUARD_CONFIG";
pub const CONFIG_FILE_NAME: &str = "ctxguard.toml";
pub const PROJECT_CONFIG_DIR: &str = ".ctxguard";

/// Where the summarization model lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Server root; `/v1/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used when the host does not name the session's model.
    #[serde(default = "default_model")]
    pub model: String,
    /// Upper bound on one summarization call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding a bearer token, if the server needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_model() -> String {
    "llama3.1".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            api_key_env: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable logs.
    #[serde(default)]
    pub json: bool,
    /// Also append logs to this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

/// The complete ctxguard.toml configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtxguardToml {
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CtxguardToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigurationError> {
        Ok(toml::from_str(content)?)
    }

    /// Find and load the configuration, honoring an explicit path first.
    pub fn load_discovered(explicit: Option<&Path>) -> Result<(Self, PathBuf), ConfigurationError> {
        let env = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        let cwd = std::env::current_dir().ok();
        let config_dir = dirs::config_dir();
        let candidates = candidate_paths(explicit, env.as_deref(), cwd.as_deref(), config_dir.as_deref());

        // An explicit path is authoritative even when it does not exist.
        if let Some(path) = explicit.or(env.as_deref()) {
            let path = path.to_path_buf();
            if !path.exists() {
                return Err(ConfigurationError::NotFound {
                    searched: vec![path],
                });
            }
            return Ok((Self::load(&path)?, path));
        }

        match candidates.iter().find(|path| path.is_file()) {
            Some(path) => Ok((Self::load(path)?, path.clone())),
            None => Err(ConfigurationError::NotFound {
                searched: candidates,
            }),
        }
    }

    /// Validate every section, returning warnings for usable oddities.
    pub fn validate(&self) -> Result<Vec<String>, ConfigurationError> {
        let mut warnings = self.compaction.validate()?;

        if self.model.base_url.trim().is_empty() {
            return Err(ConfigurationError::invalid("model.base_url", "must not be empty"));
        }
        if !self.model.base_url.starts_with("http://") && !self.model.base_url.starts_with("https://") {
            return Err(ConfigurationError::invalid(
                "model.base_url",
                format!("must start with http:// or https://, got '{}'", self.model.base_url),
            ));
        }
        if self.model.model.trim().is_empty() {
            return Err(ConfigurationError::invalid("model.model", "must not be empty"));
        }
        if self.model.timeout_secs == 0 {
            return Err(ConfigurationError::invalid(
                "model.timeout_secs",
                "must be greater than zero",
            ));
        }
        if let Some(var) = &self.model.api_key_env
            && std::env::var_os(var).is_none()
        {
            warnings.push(format!(
                "model.api_key_env names '{}', which is not set; requests will be unauthenticated",
                var
            ));
        }

        Ok(warnings)
    }

    /// Starter configuration written by `ctxguard config init`.
    pub fn template() -> &'static str {
        r#"# ctxguard configuration

[compaction]
# Estimated context size (tokens) above which a turn is compacted.
maxTokens = 8000
# Budget for messages kept verbatim after compaction.
keepRecentTokens = 2000
# Advisory length cap for the generated summary.
summaryMaxTokens = 1000
# Characters per token used by the estimator.
charsPerToken = 4.0
# messageOverheadTokens = 0
# maxNoProgressCompactions = 3
# statsHistoryLimit = 100

[model]
# Any server exposing /v1/chat/completions (Ollama, LM Studio, llama.cpp, vLLM).
base_url = "http://127.0.0.1:11434"
model = "llama3.1"
timeout_secs = 120
# api_key_env = "CTXGUARD_API_KEY"

[logging]
level = "info"
json = false
# file = "ctxguard.log"
"#
    }
}

/// Ordered lookup locations for the configuration file.
pub fn candidate_paths(
    explicit: Option<&Path>,
    env: Option<&Path>,
    cwd: Option<&Path>,
    config_dir: Option<&Path>,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }
    if let Some(path) = env {
        paths.push(path.to_path_buf());
    }
    if let Some(dir) = cwd {
        paths.push(dir.join(PROJECT_CONFIG_DIR).join(CONFIG_FILE_NAME));
    }
    if let Some(dir) = config_dir {
        paths.push(dir.join("ctxguard").join(CONFIG_FILE_NAME));
    }
    paths
}
