use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Instruction prefixed to every model request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "When invoking a tool:\n\
- Return ONLY valid JSON.\n\
- Do NOT include schema or explanations.\n\
- Do NOT return \"properties\", \"title\", \"type\", or a JSON schema.\n\
- Do NOT include code.\n\
- Only return the values for the tool call arguments.\n\
When a tool reports an API ERROR or CONNECTION ERROR, tell the user the \
interaction could not be logged and stop calling tools.";

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub crm: CrmConfig,
    pub server: ServerConfig,
    pub checkpoint: CheckpointConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load configuration from the default path (~/.config/hcp-crm/config.toml),
    /// falling back to defaults if the file doesn't exist. A `.env` file in
    /// the working directory is read first; environment overrides win over
    /// the file.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::read_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn read_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("GROQ_MODEL") {
            self.model.model = model;
        }
        if self.model.api_key.is_none() {
            if let Some(var) = &self.model.api_key_env {
                self.model.api_key = lookup(var).filter(|k| !k.is_empty());
            }
        }
        if let Some(base) = lookup("CRM_API_BASE") {
            self.crm.api_base = base;
        }
        if let Some(dir) = lookup("CRM_CHECKPOINT_DIR") {
            self.checkpoint.dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = lookup("CRM_STORE_PATH") {
            self.store.interactions_path = Some(PathBuf::from(path));
        }
    }

    /// Write current configuration to the default path.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hcp-crm")
            .join("config.toml")
    }

    /// Data directory for checkpoints, REPL history, etc.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hcp-crm")
    }
}

/// LLM provider configuration. Any OpenAI-compatible endpoint works; Groq is
/// the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL for the OpenAI-compatible API.
    pub api_base: String,
    pub model: String,
    /// API key. Takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".into(),
            model: "llama-3.1-8b-instant".into(),
            api_key: None,
            api_key_env: Some("GROQ_API_KEY".into()),
            max_tokens: 256,
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

/// Agent loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Turn ceiling per run. A turn is one model call or one batch of tool
    /// calls.
    pub max_turns: usize,
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

/// Where the logging tool sends interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    pub api_base: String,
    pub log_path: String,
    /// Timeout for one logging request, in seconds.
    pub timeout_secs: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".into(),
            log_path: "/api/v1/interactions/log_form".into(),
            timeout_secs: 15,
        }
    }
}

impl CrmConfig {
    pub fn log_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            self.log_path.trim_start_matches('/')
        )
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    pub port: u16,
    /// Prefix for the versioned API routes.
    pub api_prefix: String,
    /// Enable CORS.
    pub cors: bool,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            api_prefix: "/api/v1".into(),
            cors: true,
            cors_origins: vec![
                "http://localhost:3000".into(),
                "http://127.0.0.1:3000".into(),
            ],
        }
    }
}

/// Conversation checkpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Directory for per-thread checkpoint files. In-memory when unset.
    pub dir: Option<PathBuf>,
}

/// Interaction store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file mirroring the stored interactions. In-memory when unset.
    pub interactions_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("llama-3.1-8b-instant"));
        assert!(toml_str.contains("log_form"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.model, config.model.model);
        assert_eq!(parsed.agent.max_turns, config.agent.max_turns);
        assert_eq!(parsed.server.cors_origins, config.server.cors_origins);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: AppConfig = toml::from_str("[agent]\nmax_turns = 4\n").unwrap();
        assert_eq!(parsed.agent.max_turns, 4);
        assert_eq!(parsed.agent.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(parsed.crm.timeout_secs, 15);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GROQ_MODEL", "llama-3.3-70b-versatile"),
            ("GROQ_API_KEY", "gsk-test"),
            ("CRM_API_BASE", "http://crm:9000"),
            ("CRM_CHECKPOINT_DIR", "/tmp/checkpoints"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.model.model, "llama-3.3-70b-versatile");
        assert_eq!(config.model.api_key.as_deref(), Some("gsk-test"));
        assert_eq!(config.crm.log_url(), "http://crm:9000/api/v1/interactions/log_form");
        assert_eq!(config.checkpoint.dir, Some(PathBuf::from("/tmp/checkpoints")));
        assert!(config.store.interactions_path.is_none());
    }

    #[test]
    fn test_explicit_api_key_is_not_overridden() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("from-file".into());
        config.apply_env(|_| Some("from-env".into()));
        assert_eq!(config.model.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9100\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.server.port, 9100);
    }
}
