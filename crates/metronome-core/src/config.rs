use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Pub/sub channel every lifecycle event is published on.
pub const EVENTS_CHANNEL: &str = "scheduler:events";
/// Executor responses larger than this are truncated before persisting.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024; // 64 KB

/// Top-level config (metronome.toml + METRONOME_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetronomeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub executor: ExecutorConfig,
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

/// Distributed-lock store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Redis URL of the shared lock store. When unset the in-process
    /// backend is used: fine for a single scheduler instance, unsafe
    /// for a fleet.
    pub url: Option<String>,
    /// Lease TTL in seconds, the safety net for crashed holders.
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: u64,
    /// Keep leases alive across long executor calls via background renewal.
    #[serde(default = "bool_true")]
    pub auto_renew: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            url: None,
            ttl_secs: default_lock_ttl_secs(),
            auto_renew: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA zone applied when a schedule row has none.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// How often schedules are re-read from the store to pick up external
    /// edits (enable/disable/create) without a restart.
    #[serde(default = "default_reload_secs")]
    pub reload_interval_secs: u64,
    /// Publish lifecycle events on the lock-store pub/sub channel.
    #[serde(default = "bool_true")]
    pub publish_events: bool,
    /// Identity used for the fleet heartbeat key. Generated when unset.
    pub instance_id: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            reload_interval_secs: default_reload_secs(),
            publish_events: true,
            instance_id: None,
        }
    }
}

/// External collaborators this tier dispatches into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Base URL of the agent-message executor.
    pub base_url: String,
    /// Hard cap on one executor call, in seconds.
    #[serde(default = "default_executor_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL of the workflow-execution API. Falls back to `base_url`.
    pub workflow_url: Option<String>,
    /// Activity-tracking API for start/completion markers. Optional and
    /// fire-and-forget; failures never fail an execution.
    pub activity_url: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_lock_ttl_secs() -> u64 {
    60
}
fn default_reload_secs() -> u64 {
    60
}
fn default_executor_timeout_secs() -> u64 {
    300
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.metronome/metronome.db", home)
}

impl MetronomeConfig {
    /// Load config from a TOML file with METRONOME_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. METRONOME_CONFIG env var
    ///   3. ~/.metronome/metronome.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: MetronomeConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("METRONOME_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    if let Ok(p) = std::env::var("METRONOME_CONFIG") {
        return p;
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.metronome/metronome.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_every_section() {
        let toml = r#"
            [executor]
            base_url = "http://localhost:9000"
        "#;
        let config: MetronomeConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .unwrap();

        assert_eq!(config.gateway.port, DEFAULT_PORT);
        assert_eq!(config.lock.ttl_secs, 60);
        assert!(config.lock.auto_renew);
        assert!(config.lock.url.is_none());
        assert_eq!(config.scheduler.timezone, "UTC");
        assert_eq!(config.executor.timeout_secs, 300);
        assert!(config.scheduler.publish_events);
    }

    #[test]
    fn lock_section_overrides() {
        let toml = r#"
            [executor]
            base_url = "http://localhost:9000"

            [lock]
            url = "redis://127.0.0.1:6379/0"
            ttl_secs = 30
            auto_renew = false
        "#;
        let config: MetronomeConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .unwrap();

        assert_eq!(config.lock.url.as_deref(), Some("redis://127.0.0.1:6379/0"));
        assert_eq!(config.lock.ttl_secs, 30);
        assert!(!config.lock.auto_renew);
    }
}
