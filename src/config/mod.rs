use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::metadata::FallbackPolicy;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub is_dev: bool,
    /// Origins allowed to call the API cross-origin in production.
    pub allowed_origins: Vec<String>,
    pub fetch_timeout: Duration,
    pub request_timeout: Duration,
    pub fallback: FallbackPolicy,
    pub block_private_targets: bool,
    pub database_url: Option<String>,
    /// Remote `fetchTitle` endpoint used by bookmark sync clients.
    pub function_url: Option<String>,
    pub bookmark_cache_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source. `from_env` is the
    /// production entry point; tests pass a map here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Config {
            server_host: var("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            server_port: parse_or("SERVER_PORT", var("SERVER_PORT"), 8080)?,
            is_dev: var("APP_ENV").as_deref() != Some("production"),
            allowed_origins: var("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            fetch_timeout: Duration::from_secs(parse_or(
                "FETCH_TIMEOUT_SECS",
                var("FETCH_TIMEOUT_SECS"),
                10,
            )?),
            request_timeout: Duration::from_secs(parse_or(
                "REQUEST_TIMEOUT_SECS",
                var("REQUEST_TIMEOUT_SECS"),
                30,
            )?),
            fallback: parse_or(
                "METADATA_FALLBACK",
                var("METADATA_FALLBACK"),
                FallbackPolicy::default(),
            )?,
            block_private_targets: parse_or(
                "BLOCK_PRIVATE_TARGETS",
                var("BLOCK_PRIVATE_TARGETS"),
                false,
            )?,
            database_url: var("DATABASE_URL"),
            function_url: var("FUNCTION_URL"),
            bookmark_cache_path: var("BOOKMARK_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".slipit/bookmarks.json")),
        };

        // The request deadline (408) must outlast the fetch timeout.
        if config.request_timeout <= config.fetch_timeout {
            return Err(ConfigError::Invalid {
                name: "REQUEST_TIMEOUT_SECS",
                value: config.request_timeout.as_secs().to_string(),
            });
        }

        Ok(config)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_or<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
