//! Layered configuration for the reference gateway: a `Default` impl,
//! serde field defaults, loaded from `AC_CONFIG` (or `config.toml`) if
//! present and falling back to defaults otherwise — the core
//! (`ac-conversation`) itself takes no config file, only the in-process
//! `ConversationConfig` constructed here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub mcp: ac_mcp_client::McpConfig,
}

impl Config {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "server.port must not be 0".into(),
            });
        }
        if self.conversation.max_iterations == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "conversation.max_iterations must be > 0".into(),
            });
        }
        if self.llm.api_key_env.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "llm.api_key_env is empty — LLM calls will fail unless the provider needs no key".into(),
            });
        }
        if std::env::var(&self.llm.api_key_env).is_err() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!("environment variable '{}' is not set", self.llm.api_key_env),
            });
        }
        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            ConfigSeverity::Warning => "warning",
            ConfigSeverity::Error => "error",
        };
        write!(f, "[{label}] {}", self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: d_port(), host: d_host(), cors: CorsConfig::default() }
    }
}

fn d_port() -> u16 {
    8089
}

fn d_host() -> String {
    "127.0.0.1".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { allowed_origins: d_cors_origins() }
    }
}

fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".into()]
}

/// Mirrors the core's `ConversationConfig` the embedding program
/// constructs directly; this is the file-backed copy the reference
/// server reads before handing the values to `ac_conversation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u64,
    #[serde(default = "d_condenser_keep_first")]
    pub condenser_keep_first: usize,
    #[serde(default = "d_condenser_keep_last")]
    pub condenser_keep_last: usize,
    #[serde(default = "d_condenser_trigger_len")]
    pub condenser_trigger_len: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_iterations: d_max_iterations(),
            condenser_keep_first: d_condenser_keep_first(),
            condenser_keep_last: d_condenser_keep_last(),
            condenser_trigger_len: d_condenser_trigger_len(),
        }
    }
}

fn d_max_iterations() -> u64 {
    500
}

fn d_condenser_keep_first() -> usize {
    4
}

fn d_condenser_keep_last() -> usize {
    20
}

fn d_condenser_trigger_len() -> usize {
    80
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_llm_base_url")]
    pub base_url: String,
    #[serde(default = "d_llm_model")]
    pub model: String,
    #[serde(default = "d_llm_api_key_env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { base_url: d_llm_base_url(), model: d_llm_model(), api_key_env: d_llm_api_key_env() }
    }
}

fn d_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn d_llm_model() -> String {
    "gpt-4o-mini".into()
}

fn d_llm_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

/// Load from the path named by `AC_CONFIG` (default `config.toml`) if it
/// exists, else [`Config::default()`].
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("AC_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path).map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };
    Ok((config, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_fatal_errors() {
        let config = Config::default();
        let issues = config.validate();
        assert!(issues.iter().all(|i| i.severity != ConfigSeverity::Error));
    }

    #[test]
    fn zero_port_is_an_error() {
        let mut config = Config::default();
        config.server.port = 0;
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.severity == ConfigSeverity::Error));
    }
}
