//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development. Generation only works once
//! `OPENAI_API_KEY` is set.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rngesus_engine::BackendConfig;
use rngesus_shared::constants::{
    DEFAULT_BASE_URL, DEFAULT_HTTP_PORT, DEFAULT_MODEL, DEFAULT_UPDATE_FREQUENCY_SECS,
};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `rngesus.db` in the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Env: `OPENAI_API_KEY`
    pub openai_api_key: String,

    /// Env: `OPENAI_MODEL`
    /// Default: `gpt-3.5-turbo`
    pub openai_model: String,

    /// Root of an OpenAI-compatible API.
    /// Env: `OPENAI_BASE_URL`
    /// Default: `https://api.openai.com/v1`
    pub openai_base_url: String,

    /// Env: `GENERATION_TIMEOUT_SECS`
    /// Default: `300`
    pub generation_timeout: Duration,

    /// Minimum spacing between streamed updates.
    /// Env: `UPDATE_FREQUENCY_SECS` (fractional seconds)
    /// Default: `1.0`
    pub update_frequency: Duration,

    /// Sustained generation requests per second per client IP.
    /// Env: `RATE_LIMIT_PER_SEC`
    /// Default: `1`
    pub rate_limit_per_sec: f64,

    /// Env: `RATE_LIMIT_BURST`
    /// Default: `5`
    pub rate_limit_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            openai_api_key: String::new(),
            openai_model: DEFAULT_MODEL.to_string(),
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            generation_timeout: Duration::from_secs(300),
            update_frequency: Duration::from_secs_f64(DEFAULT_UPDATE_FREQUENCY_SECS),
            rate_limit_per_sec: 1.0,
            rate_limit_burst: 5.0,
        }
    }
}

// Keeps the API key out of logs.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("openai_api_key", &if self.openai_api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .field("generation_timeout", &self.generation_timeout)
            .field("update_frequency", &self.update_frequency)
            .field("rate_limit_per_sec", &self.rate_limit_per_sec)
            .field("rate_limit_burst", &self.rate_limit_burst)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parsed(&var, "HTTP_ADDR") {
            config.http_addr = addr;
        }

        if let Some(path) = var("DATABASE_PATH").filter(|p| !p.trim().is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(key) = var("OPENAI_API_KEY") {
            config.openai_api_key = key.trim().to_string();
        }

        if let Some(model) = var("OPENAI_MODEL").filter(|m| !m.trim().is_empty()) {
            config.openai_model = model;
        }

        if let Some(url) = var("OPENAI_BASE_URL").filter(|u| !u.trim().is_empty()) {
            config.openai_base_url = url;
        }

        if let Some(secs) = parsed::<u64>(&var, "GENERATION_TIMEOUT_SECS") {
            config.generation_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parsed::<f64>(&var, "UPDATE_FREQUENCY_SECS") {
            match Duration::try_from_secs_f64(secs) {
                Ok(interval) => config.update_frequency = interval,
                Err(_) => tracing::warn!(value = secs, "Invalid UPDATE_FREQUENCY_SECS, using default"),
            }
        }

        if let Some(rate) = parsed::<f64>(&var, "RATE_LIMIT_PER_SEC").filter(|r| *r > 0.0) {
            config.rate_limit_per_sec = rate;
        }

        if let Some(burst) = parsed::<f64>(&var, "RATE_LIMIT_BURST").filter(|b| *b >= 1.0) {
            config.rate_limit_burst = burst;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            api_key: self.openai_api_key.clone(),
            model: self.openai_model.clone(),
            base_url: self.openai_base_url.clone(),
            timeout: self.generation_timeout,
        }
    }
}

/// Parse an env value, warning and returning `None` when it is malformed.
fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.openai_model, "gpt-3.5-turbo");
        assert_eq!(config.update_frequency, Duration::from_secs(1));
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/tmp/rngesus.db"),
            ("OPENAI_API_KEY", " sk-test "),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("UPDATE_FREQUENCY_SECS", "0.25"),
            ("RATE_LIMIT_BURST", "10"),
        ]);
        assert_eq!(config.http_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/rngesus.db")));
        assert_eq!(config.openai_api_key, "sk-test");
        assert_eq!(config.update_frequency, Duration::from_millis(250));
        assert_eq!(config.rate_limit_burst, 10.0);

        let backend = config.backend_config();
        assert_eq!(backend.model, "gpt-4o-mini");
        assert_eq!(backend.api_key, "sk-test");
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "not an address"),
            ("UPDATE_FREQUENCY_SECS", "-1"),
            ("GENERATION_TIMEOUT_SECS", "soon"),
            ("RATE_LIMIT_PER_SEC", "0"),
        ]);
        let defaults = ServerConfig::default();
        assert_eq!(config.http_addr, defaults.http_addr);
        assert_eq!(config.update_frequency, defaults.update_frequency);
        assert_eq!(config.generation_timeout, defaults.generation_timeout);
        assert_eq!(config.rate_limit_per_sec, defaults.rate_limit_per_sec);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = from_pairs(&[("OPENAI_API_KEY", "sk-secret")]);
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
