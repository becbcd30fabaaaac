use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,
    #[serde(default)]
    pub keep_alive: KeepAliveConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KeepAliveConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Target to probe. Falls back to this process's own `/health`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Settings for one `UptimeMonitor`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonitorConfig {
    pub url: String,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

pub fn default_port() -> u16 { 8080 }
pub fn default_service_name() -> String { "telegram-giveaway-bot".into() }
pub fn default_telegram_api_url() -> String { "https://api.telegram.org".into() }
fn default_enabled() -> bool { true }
pub fn default_interval() -> u64 { 300 }
pub fn default_timeout() -> u64 { 10 }

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            url: None,
            interval: default_interval(),
            timeout: default_timeout(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            service_name: default_service_name(),
            bot_token: None,
            telegram_api_url: default_telegram_api_url(),
            keep_alive: KeepAliveConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads `HEALTH_CONFIG` (or `config.json`) when present, the environment otherwise.
    pub fn load() -> Result<Self> {
        let path = std::env::var("HEALTH_CONFIG").unwrap_or_else(|_| "config.json".into());
        if Path::new(&path).exists() {
            Self::from_file(&path)
        } else {
            Self::from_lookup(|key| std::env::var(key).ok())
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(port) = get("PORT") {
            config.port = port.parse().with_context(|| format!("Invalid PORT: {}", port))?;
        }
        if let Some(name) = get("SERVICE_NAME") {
            config.service_name = name;
        }
        config.bot_token = get("BOT_TOKEN");
        if let Some(url) = get("TELEGRAM_API_URL") {
            config.telegram_api_url = url;
        }
        if let Some(enabled) = get("KEEP_ALIVE_ENABLED") {
            config.keep_alive.enabled = enabled.eq_ignore_ascii_case("true") || enabled == "1";
        }
        config.keep_alive.url = get("KEEP_ALIVE_URL");
        if let Some(interval) = get("KEEP_ALIVE_INTERVAL") {
            config.keep_alive.interval = interval
                .parse()
                .with_context(|| format!("Invalid KEEP_ALIVE_INTERVAL: {}", interval))?;
        }
        if let Some(timeout) = get("KEEP_ALIVE_TIMEOUT") {
            config.keep_alive.timeout = timeout
                .parse()
                .with_context(|| format!("Invalid KEEP_ALIVE_TIMEOUT: {}", timeout))?;
        }
        Ok(config)
    }

    /// Monitor settings, or `None` when keep-alive is switched off.
    pub fn monitor(&self) -> Option<MonitorConfig> {
        if !self.keep_alive.enabled {
            return None;
        }
        let url = self
            .keep_alive
            .url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}/health", self.port));
        Some(MonitorConfig {
            url,
            interval: self.keep_alive.interval,
            timeout: self.keep_alive.timeout,
        })
    }
}
