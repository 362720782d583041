use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::paths::config_json_path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub http_proxy: String,
    #[serde(default)]
    pub https_proxy: String,
    #[serde(default)]
    pub http_proxy_auth: Option<ProxyAuth>,
    #[serde(default)]
    pub https_proxy_auth: Option<ProxyAuth>,
    /// Fixed delay between two resume polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Transport retries for branch/version queries. Resume and mutations are never retried.
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

const CONFIG_FILE_PATH: &str = "config.toml";

fn default_api_base() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_fetch_retries() -> u32 {
    2
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Built-in defaults, without looking at files or the environment.
    pub fn defaults() -> Self {
        Config {
            api_base: default_api_base(),
            api_key: None,
            http_proxy: String::new(),
            https_proxy: String::new(),
            http_proxy_auth: None,
            https_proxy_auth: None,
            poll_interval_ms: default_poll_interval_ms(),
            fetch_retries: default_fetch_retries(),
        }
    }

    /// Load `~/.chatstream/config.json`, falling back to `./config.toml`, then
    /// apply environment overrides.
    pub fn new() -> Self {
        let mut config = Self::load_from(&config_json_path(), Path::new(CONFIG_FILE_PATH));
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load from the given files without consulting the environment.
    pub fn load_from(json_path: &Path, toml_path: &Path) -> Self {
        if json_path.exists() {
            match std::fs::read_to_string(json_path)
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    serde_json::from_str::<Config>(&content).map_err(|e| e.to_string())
                }) {
                Ok(config) => return config,
                Err(err) => tracing::warn!(
                    path = %json_path.display(),
                    error = %err,
                    "Ignoring unreadable config file"
                ),
            }
        }

        if toml_path.exists() {
            match std::fs::read_to_string(toml_path)
                .map_err(|e| e.to_string())
                .and_then(|content| toml::from_str::<Config>(&content).map_err(|e| e.to_string()))
            {
                Ok(config) => return config,
                Err(err) => tracing::warn!(
                    path = %toml_path.display(),
                    error = %err,
                    "Ignoring unreadable config file"
                ),
            }
        }

        Self::defaults()
    }

    /// Override fields from environment-style lookups.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base) = lookup("CHAT_API_BASE") {
            self.api_base = api_base;
        }
        if let Some(api_key) = lookup("CHAT_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(http_proxy) = lookup("HTTP_PROXY") {
            self.http_proxy = http_proxy;
        }
        if let Some(https_proxy) = lookup("HTTPS_PROXY") {
            self.https_proxy = https_proxy;
        }
        if let Some(interval) = lookup("CHAT_POLL_INTERVAL_MS") {
            match interval.trim().parse() {
                Ok(ms) => self.poll_interval_ms = ms,
                Err(_) => tracing::warn!(value = %interval, "Invalid CHAT_POLL_INTERVAL_MS"),
            }
        }
        if let Some(retries) = lookup("CHAT_FETCH_RETRIES") {
            match retries.trim().parse() {
                Ok(count) => self.fetch_retries = count,
                Err(_) => tracing::warn!(value = %retries, "Invalid CHAT_FETCH_RETRIES"),
            }
        }
        if let Some(no_proxy) = lookup("CHAT_NO_PROXY") {
            if parse_bool_env(&no_proxy) {
                self.http_proxy.clear();
                self.https_proxy.clear();
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
