//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (database key, API keys) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::types::CoinwatchError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub market_data: MarketDataConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub poll_interval_secs: u64,
    /// How many coins to request per poll.
    pub top_n: u32,
    pub prompt: String,
    /// Maximum model turns per agent run.
    pub max_steps: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            top_n: 50,
            prompt: "Get the latest market data for the top 50 cryptocurrencies by market cap."
                .to_string(),
            max_steps: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// When false the agent calls its tool directly without a model.
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    /// Env var holding the bearer key. Ollama ignores it.
    pub api_key_env: Option<String>,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3.2".to_string(),
            api_key_env: None,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub vs_currency: String,
    pub api_key_env: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            vs_currency: "usd".to_string(),
            api_key_env: "CRYPTO_API_KEY".to_string(),
        }
    }
}

/// Which `CoinStore` implementation to build.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Supabase,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub table: String,
    pub url_env: String,
    pub key_env: String,
    /// SQLite connection string, used when `backend = "sqlite"`.
    pub sqlite_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Supabase,
            table: "cryptocurrencies".to_string(),
            url_env: "SUPABASE_URL".to_string(),
            key_env: "SUPABASE_KEY".to_string(),
            sqlite_url: "sqlite://coinwatch.db?mode=rwc".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stdio,
    Http,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub transport: Transport,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Supabase Crypto DB MCP Server".to_string(),
            transport: Transport::Stdio,
            port: 8765,
        }
    }
}

/// Hosted database credentials, resolved from the environment.
#[derive(Debug, Clone)]
pub struct DatabaseCredentials {
    pub url: String,
    pub key: SecretString,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text. Missing sections take defaults.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            warn!(path, "Config file not found, using built-in defaults");
            Ok(Self::default())
        }
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        match std::env::var(env_name) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(CoinwatchError::Config(format!(
                "Environment variable not set: {env_name}"
            ))
            .into()),
        }
    }

    /// Resolve a secret. Missing secrets are configuration errors.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Self::resolve_env(env_name).map(SecretString::new)
    }

    /// Hosted database URL and key. Missing either aborts startup.
    pub fn database_credentials(&self) -> Result<DatabaseCredentials> {
        let url = Self::resolve_env(&self.database.url_env)
            .context("Supabase URL or key not found")?;
        let key = Self::resolve_secret(&self.database.key_env)
            .context("Supabase URL or key not found")?;
        Ok(DatabaseCredentials { url, key })
    }

    /// Market data API key. Required by the poller.
    pub fn market_data_key(&self) -> Result<SecretString> {
        Self::resolve_secret(&self.market_data.api_key_env)
    }

    /// Optional LLM bearer key.
    pub fn llm_api_key(&self) -> Option<SecretString> {
        self.llm
            .api_key_env
            .as_deref()
            .and_then(|env| Self::resolve_secret(env).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::error_category;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.poll_interval_secs, 5);
        assert_eq!(cfg.agent.top_n, 50);
        assert_eq!(cfg.llm.model, "llama3.2");
        assert_eq!(cfg.database.backend, DatabaseBackend::Supabase);
        assert_eq!(cfg.database.table, "cryptocurrencies");
        assert_eq!(cfg.server.transport, Transport::Stdio);
    }

    #[test]
    fn test_parse_partial_config() {
        let cfg = AppConfig::parse(
            r#"
            [agent]
            poll_interval_secs = 60

            [database]
            backend = "sqlite"
            sqlite_url = "sqlite::memory:"

            [server]
            transport = "http"
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent.poll_interval_secs, 60);
        assert_eq!(cfg.agent.top_n, 50);
        assert_eq!(cfg.database.backend, DatabaseBackend::Sqlite);
        assert_eq!(cfg.database.sqlite_url, "sqlite::memory:");
        assert_eq!(cfg.server.transport, Transport::Http);
        assert_eq!(cfg.server.port, 9000);
        assert!(cfg.llm.enabled);
    }

    #[test]
    fn test_parse_rejects_unknown_backend() {
        assert!(AppConfig::parse("[database]\nbackend = \"mongodb\"").is_err());
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(AppConfig::load("/tmp/coinwatch_does_not_exist.toml").is_err());
        assert!(AppConfig::load_or_default("/tmp/coinwatch_does_not_exist.toml").is_ok());
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let err = AppConfig::resolve_secret("COINWATCH_TEST_UNSET_VAR_8841").unwrap_err();
        assert_eq!(error_category(&err), "config");
    }

    #[test]
    fn test_missing_credentials_abort() {
        let mut cfg = AppConfig::default();
        cfg.database.url_env = "COINWATCH_TEST_UNSET_URL_1193".into();
        cfg.database.key_env = "COINWATCH_TEST_UNSET_KEY_1193".into();
        assert!(cfg.database_credentials().is_err());
    }

    #[test]
    fn test_resolve_secret_present() {
        std::env::set_var("COINWATCH_TEST_SECRET_5521", "s3cret");
        let secret = AppConfig::resolve_secret("COINWATCH_TEST_SECRET_5521").unwrap();
        assert_eq!(secret.expose_secret(), "s3cret");
    }

    #[test]
    fn test_shipped_config_parses() {
        let cfg = AppConfig::load("config.toml").unwrap();
        assert_eq!(cfg.database.backend, DatabaseBackend::Supabase);
        assert_eq!(cfg.server.transport, Transport::Stdio);
        assert_eq!(cfg.server.port, 8765);
    }
}
