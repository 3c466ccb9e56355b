//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The management API key is loaded from HAILUO_API_KEY or api_key_file,
//! never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub tokens: TokensConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(skip)]
    pub api_key: Option<Secret<String>>,
    /// Path to a file containing the API key (alternative to HAILUO_API_KEY)
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,
}

/// Token pool settings
#[derive(Debug, Deserialize)]
pub struct TokensConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Used only when the store holds no tokens.
    #[serde(default)]
    pub bootstrap: Vec<String>,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Overrides the provider's renewal URL (staging, local fakes).
    #[serde(default)]
    pub renewal_endpoint: Option<String>,
}

impl TokensConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

fn default_max_connections() -> usize {
    1000
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/tokens.json")
}

fn default_refresh_interval_secs() -> u64 {
    hailuo_pool::DEFAULT_REFRESH_INTERVAL.as_secs()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// API key resolution order:
    /// 1. HAILUO_API_KEY env var
    /// 2. api_key_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.tokens.refresh_interval_secs == 0 {
            return Err(common::Error::Config(
                "refresh_interval_secs must be greater than 0".into(),
            ));
        }

        if let Some(endpoint) = &config.tokens.renewal_endpoint
            && !endpoint.starts_with("http://")
            && !endpoint.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "renewal_endpoint must start with http:// or https://, got: {endpoint}"
            )));
        }

        config.tokens.bootstrap = normalize_bootstrap(std::mem::take(&mut config.tokens.bootstrap))?;

        if let Ok(key) = std::env::var("HAILUO_API_KEY") {
            config.server.api_key = Some(Secret::new(key));
        } else if let Some(ref key_file) = config.server.api_key_file {
            let key = std::fs::read_to_string(key_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read api_key_file {}: {e}",
                    key_file.display()
                ))
            })?;
            let key = key.trim().to_owned();
            if !key.is_empty() {
                config.server.api_key = Some(Secret::new(key));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("hailuo-proxy.toml")
    }
}

/// Trim entries, reject blank ones and drop repeats (first occurrence wins).
fn normalize_bootstrap(entries: Vec<String>) -> common::Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let token = entry.trim();
        if token.is_empty() {
            return Err(common::Error::Config(format!(
                "bootstrap token at index {i} is empty"
            )));
        }
        if seen.insert(token.to_owned()) {
            tokens.push(token.to_owned());
        }
    }
    Ok(tokens)
}
