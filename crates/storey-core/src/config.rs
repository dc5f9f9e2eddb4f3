use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, StoreyError};

/// Top-level configuration for the Storey shopping assistant.
///
/// Loaded from `~/.storey/config.toml` by default. Every section is optional
/// in the file; missing sections and fields fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

impl StoreyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StoreyConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the chat core cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.chat.memory_window == 0 {
            return Err(StoreyError::Config(
                "chat.memory_window must be at least 1".to_string(),
            ));
        }
        if self.chat.max_sessions == 0 {
            return Err(StoreyError::Config(
                "chat.max_sessions must be at least 1".to_string(),
            ));
        }
        if self.chat.tool_call_budget == 0 {
            return Err(StoreyError::Config(
                "chat.tool_call_budget must be at least 1".to_string(),
            ));
        }
        if self.search.embedding_dimensions == 0 {
            return Err(StoreyError::Config(
                "search.embedding_dimensions must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(StoreyError::Config(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP API port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.storey/data".to_string(),
            log_level: "info".to_string(),
            port: 5000,
        }
    }
}

/// Chat core settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of past exchanges kept in each session's memory window.
    pub memory_window: usize,
    /// Maximum number of live memory windows before the least recently
    /// used one is evicted.
    pub max_sessions: usize,
    /// Minutes of inactivity after which a memory window is dropped.
    pub session_idle_minutes: u64,
    /// Maximum tool invocations the agent may make in a single turn.
    pub tool_call_budget: usize,
    /// Default cap on messages returned by the history read path.
    pub history_limit: usize,
    /// Maximum user message length in characters.
    pub max_message_length: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            memory_window: 10,
            max_sessions: 10_000,
            session_idle_minutes: 120,
            tool_call_budget: 6,
            history_limit: 50,
            max_message_length: 4000,
        }
    }
}

/// Language model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider kind. Only "openai" (any OpenAI-compatible endpoint) is built in.
    pub provider: String,
    /// Base URL of the chat-completions API.
    pub api_base: String,
    /// Model name sent with each request.
    pub model: String,
    /// API key. When unset the key is read from `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    /// Resolve the API key from the config or the configured env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            request_timeout_secs: 60,
        }
    }
}

/// Product search settings used by the chat tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results requested from the vector index by `search_products`.
    pub search_top_k: usize,
    /// Recommendations returned by `get_recommendations`.
    pub recommendation_k: usize,
    /// Default `limit` for `filter_products`.
    pub filter_default_limit: usize,
    /// How many filter matches are surfaced to the agent by id.
    pub filter_preview_count: usize,
    /// Dimensionality of product embeddings.
    pub embedding_dimensions: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            search_top_k: 6,
            recommendation_k: 4,
            filter_default_limit: 50,
            filter_preview_count: 5,
            embedding_dimensions: 384,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = StoreyConfig::default();
        assert_eq!(config.general.data_dir, "~/.storey/data");
        assert_eq!(config.general.port, 5000);
        assert_eq!(config.chat.memory_window, 10);
        assert_eq!(config.chat.history_limit, 50);
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.search.search_top_k, 6);
        assert_eq!(config.search.recommendation_k, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
data_dir = "/srv/storey"
log_level = "debug"
port = 8080

[chat]
memory_window = 4
tool_call_budget = 3

[llm]
api_base = "http://localhost:11434/v1"
model = "llama3"
api_key = "local"
"#;
        let file = create_temp_config(content);
        let config = StoreyConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "/srv/storey");
        assert_eq!(config.general.port, 8080);
        assert_eq!(config.chat.memory_window, 4);
        assert_eq!(config.chat.tool_call_budget, 3);
        assert_eq!(config.chat.history_limit, 50);
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.llm.resolve_api_key().as_deref(), Some("local"));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[general]\nlog_level = \"warn\"\n");
        let config = StoreyConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.chat.memory_window, 10);
        assert_eq!(config.search.filter_default_limit, 50);
    }

    #[test]
    fn test_load_rejects_zero_window() {
        let file = create_temp_config("[chat]\nmemory_window = 0\n");
        let err = StoreyConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, StoreyError::Config(_)));
        assert!(err.to_string().contains("memory_window"));
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is not [valid toml");
        assert!(StoreyConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = StoreyConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.storey/data");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = StoreyConfig::default();
        config.chat.max_sessions = 12;
        config.save(&path).unwrap();

        let reloaded = StoreyConfig::load(&path).unwrap();
        assert_eq!(reloaded.chat.max_sessions, 12);
        assert_eq!(reloaded.llm.api_base, config.llm.api_base);
    }

    #[test]
    fn test_temperature_out_of_range() {
        let mut config = StoreyConfig::default();
        config.llm.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_api_key_falls_back_to_env_name() {
        let config = LlmConfig {
            api_key: Some("   ".to_string()),
            api_key_env: "STOREY_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..LlmConfig::default()
        };
        assert!(config.resolve_api_key().is_none());
    }
}
