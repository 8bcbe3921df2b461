use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Engine constants — shared by the scheduler and gateway crates
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DISPATCH_TIMEOUT_SECS: u64 = 10; // per outbound call, from request start
pub const MAX_CAPTURED_BODY_BYTES: usize = 10 * 1024; // response capture cap; excess is discarded
pub const SHUTDOWN_GRACE_SECS: u64 = 12; // > DISPATCH_TIMEOUT_SECS so in-flight outcomes always land

/// Top-level config (hookbeat.toml + HOOKBEAT_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookbeatConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Default for HookbeatConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.hookbeat/hookbeat.db", home)
}

impl HookbeatConfig {
    /// Load config from a TOML file with HOOKBEAT_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.hookbeat/hookbeat.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: HookbeatConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("HOOKBEAT_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.hookbeat/hookbeat.toml", home)
}
