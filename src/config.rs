//! Runtime configuration.
//!
//! Values come from the process environment (optionally seeded from a `.env`
//! file by the binary). The two secrets are not validated here: a missing
//! database URL or API key only shows up when a request first needs it.

use crate::error::ConfigError;
use sqlx::postgres::PgSslMode;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MODEL: &str = "gpt-4-turbo";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Unset means the HTTP client's default.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub ssl_mode: PgSslMode,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Builds the configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("OPENAI_API_KEY").unwrap_or_else(|| {
            warn!("OPENAI_API_KEY not set - LLM calls will fail");
            String::new()
        });
        let url = get("DATABASE_URL").unwrap_or_else(|| {
            warn!("DATABASE_URL not set - database calls will fail");
            String::new()
        });

        let ssl_mode = match get("DATABASE_SSL_MODE") {
            Some(raw) => PgSslMode::from_str(&raw).map_err(|_| ConfigError::InvalidValue {
                name: "DATABASE_SSL_MODE".to_string(),
                value: raw.clone(),
            })?,
            None => PgSslMode::Require,
        };

        let timeout = match get("LLM_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                    name: "LLM_TIMEOUT_SECS".to_string(),
                    value: raw.clone(),
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "PORT".to_string(),
                value: raw.clone(),
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            llm: LlmConfig {
                api_key,
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: get("OPENAI_BASE_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                timeout,
            },
            database: DatabaseConfig { url, ssl_mode },
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
