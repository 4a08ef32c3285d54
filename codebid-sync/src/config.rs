use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("invalid server url: {0:?}")]
    InvalidServerUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Coordinator base without any `/api` suffix.
    pub server_url: String,
    pub ws_url: String,
    pub request_timeout: Duration,
    pub snapshot_attempts: u32,
    pub reconnect_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub tick_interval: Duration,
    pub drift_tolerance: Duration,
    pub desync_threshold: u32,
    pub starting_coins: u64,
    pub cache_url: String,
}

impl SyncConfig {
    pub fn new(server_url: &str) -> Result<Self, ConfigError> {
        let server_url = normalize_server_url(server_url)?;
        let ws_url = derive_ws_url(&server_url)?;
        Ok(Self {
            server_url,
            ws_url,
            request_timeout: Duration::from_millis(5000),
            snapshot_attempts: 5,
            reconnect_attempts: 100,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_millis(15_000),
            tick_interval: Duration::from_millis(1000),
            drift_tolerance: Duration::from_millis(2000),
            desync_threshold: 3,
            starting_coins: 2000,
            cache_url: "sqlite://codebid_cache.db?mode=rwc".to_string(),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let server_url =
            env::var("CODEBID_SERVER_URL").unwrap_or_else(|_| "http://localhost:5000".to_string());
        let mut config = Self::new(&server_url)?;

        if let Ok(ws_url) = env::var("CODEBID_WS_URL") {
            config.ws_url = ws_url;
        }
        if let Ok(cache_url) = env::var("CODEBID_CACHE_URL") {
            config.cache_url = cache_url;
        }
        config.request_timeout = env_millis("CODEBID_REQUEST_TIMEOUT_MS", config.request_timeout)?;
        config.snapshot_attempts = env_parse("CODEBID_SNAPSHOT_ATTEMPTS", config.snapshot_attempts)?;
        config.reconnect_attempts =
            env_parse("CODEBID_RECONNECT_ATTEMPTS", config.reconnect_attempts)?;
        config.backoff_base = env_millis("CODEBID_BACKOFF_BASE_MS", config.backoff_base)?;
        config.backoff_max = env_millis("CODEBID_BACKOFF_MAX_MS", config.backoff_max)?;
        config.tick_interval = env_millis("CODEBID_TICK_INTERVAL_MS", config.tick_interval)?;
        config.drift_tolerance = env_millis("CODEBID_DRIFT_TOLERANCE_MS", config.drift_tolerance)?;
        config.desync_threshold = env_parse("CODEBID_DESYNC_THRESHOLD", config.desync_threshold)?;
        config.starting_coins = env_parse("CODEBID_STARTING_COINS", config.starting_coins)?;

        Ok(config)
    }

    /// `{base}/api{path}`
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.server_url, path)
    }
}

fn env_parse<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

fn env_millis(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let millis = env_parse(name, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

/// Accepts `http://host:port`, `http://host:port/` or `http://host:port/api`.
pub fn normalize_server_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let base = trimmed.strip_suffix("/api").unwrap_or(trimmed);
    let base = base.trim_end_matches('/');
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ConfigError::InvalidServerUrl(raw.to_string()));
    }
    Ok(base.to_string())
}

fn derive_ws_url(server_url: &str) -> Result<String, ConfigError> {
    if let Some(rest) = server_url.strip_prefix("https://") {
        Ok(format!("wss://{}/ws", rest))
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        Ok(format!("ws://{}/ws", rest))
    } else {
        Err(ConfigError::InvalidServerUrl(server_url.to_string()))
    }
}
