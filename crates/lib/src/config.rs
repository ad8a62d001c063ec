//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.wabot/config.json`); a handful of
//! deployment values can be overridden from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Messaging gateway (Evolution API) connection.
    #[serde(default)]
    pub evolution: EvolutionConfig,

    #[serde(default)]
    pub company: CompanyConfig,

    /// Customer directory and service-record files.
    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub handoff: HandoffConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Evolution API settings. Each string is overridable from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionConfig {
    /// Base URL, e.g. `http://localhost:8080`. Overridden by EVOLUTION_API_URL.
    pub base_url: Option<String>,
    /// Sent as the `apikey` header. Overridden by EVOLUTION_API_KEY.
    pub api_key: Option<String>,
    /// Overridden by EVOLUTION_INSTANCE_NAME.
    pub instance_name: Option<String>,
    /// Public base URL of this service. When set, `<webhookUrl>/webhook/message` is
    /// registered with the messaging gateway at startup. Overridden by WEBHOOK_URL.
    pub webhook_url: Option<String>,
    /// Request timeout in seconds (default 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            instance_name: None,
            webhook_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyConfig {
    /// Name shown in greetings. Overridden by COMPANY_NAME.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryConfig {
    /// Customer/invoice JSON file. Relative paths resolve against the config directory.
    pub path: Option<PathBuf>,
    /// Service records JSON file. Relative paths resolve against the config directory.
    pub records_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffConfig {
    /// Attendant-system endpoint. When absent, hand-offs are only logged.
    pub endpoint: Option<String>,
    pub queue_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsConfig {
    /// How long a finished session is kept before the sweeper clears it (default 1800; 0 disables).
    #[serde(default = "default_finished_ttl_secs")]
    pub finished_ttl_secs: u64,
}

fn default_finished_ttl_secs() -> u64 {
    1800
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            finished_ttl_secs: default_finished_ttl_secs(),
        }
    }
}

pub const DEFAULT_COMPANY_NAME: &str = "Nossa Empresa";

/// Trimmed env var; unset or blank is `None`.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_value(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the Evolution API base URL: env EVOLUTION_API_URL overrides config.
pub fn resolve_evolution_url(config: &Config) -> Option<String> {
    env_value("EVOLUTION_API_URL").or_else(|| config_value(&config.evolution.base_url))
}

/// Resolve the Evolution API key: env EVOLUTION_API_KEY overrides config.
pub fn resolve_evolution_key(config: &Config) -> Option<String> {
    env_value("EVOLUTION_API_KEY").or_else(|| config_value(&config.evolution.api_key))
}

/// Resolve the Evolution instance: env EVOLUTION_INSTANCE_NAME overrides config.
pub fn resolve_evolution_instance(config: &Config) -> Option<String> {
    env_value("EVOLUTION_INSTANCE_NAME").or_else(|| config_value(&config.evolution.instance_name))
}

/// Resolve the public webhook base URL: env WEBHOOK_URL overrides config.
pub fn resolve_webhook_url(config: &Config) -> Option<String> {
    env_value("WEBHOOK_URL").or_else(|| config_value(&config.evolution.webhook_url))
}

/// Resolve the company name: env COMPANY_NAME, then config, then a generic default.
pub fn resolve_company_name(config: &Config) -> String {
    env_value("COMPANY_NAME")
        .or_else(|| config_value(&config.company.name))
        .unwrap_or_else(|| DEFAULT_COMPANY_NAME.to_string())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("WABOT_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".wabot").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, else the default path (or WABOT_CONFIG_PATH).
/// Missing file => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Directory holding the config file.
pub fn config_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}

fn resolve_file(configured: &Option<PathBuf>, config_path: &Path, default_name: &str) -> PathBuf {
    match configured {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                config_dir(config_path).join(p)
            }
        }
        _ => config_dir(config_path).join(default_name),
    }
}

/// Customer directory file: `directory.path`, or `directory.json` next to the config.
pub fn resolve_directory_path(config: &Config, config_path: &Path) -> PathBuf {
    resolve_file(&config.directory.path, config_path, "directory.json")
}

/// Service records file: `directory.recordsPath`, or `service_records.json` next to the config.
pub fn resolve_records_path(config: &Config, config_path: &Path) -> PathBuf {
    resolve_file(
        &config.directory.records_path,
        config_path,
        "service_records.json",
    )
}
