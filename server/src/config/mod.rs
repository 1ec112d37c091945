// File: server/src/config/mod.rs
pub mod manager;
pub mod secrets;

use serde::{Deserialize, Serialize};

pub use manager::ConfigManager;
pub use secrets::SecretsLoader;

/// Top-level server configuration, loaded from `config/fleet-server.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Base URL of the PromQL-compatible time-series store.
    pub tsdb_url: String,

    /// Path to the sqlite database file.
    pub database_path: String,

    /// Heartbeat grace period: a probe session with no heartbeat for this
    /// long is disconnected. Exposed as a parameter rather than
    /// hard-coded, since the right grace period depends on deployment
    /// network conditions.
    #[serde(default = "default_heartbeat_grace_seconds")]
    pub heartbeat_grace_seconds: u64,

    /// Alert sweep tick interval (cert / service-down / agent-offline).
    #[serde(default = "default_alert_sweep_seconds")]
    pub alert_sweep_seconds: u64,

    /// Traffic accounting housekeeping tick interval (rollover check).
    #[serde(default = "default_traffic_housekeeping_seconds")]
    pub traffic_housekeeping_seconds: u64,

    /// TTL, in seconds, for the dashboard monitor-overview cache.
    #[serde(default = "default_overview_cache_ttl_seconds")]
    pub monitor_overview_cache_ttl_seconds: i64,

    /// Notification channels (webhook URLs); empty means notifications are
    /// disabled but alert records are still written.
    #[serde(default)]
    pub notification_webhooks: Vec<String>,

    /// Base URL of an optional GeoIP lookup gateway. Absent means the core
    /// falls back to a no-op lookup.
    #[serde(default)]
    pub geoip_base_url: Option<String>,
}

fn default_heartbeat_grace_seconds() -> u64 {
    crate::constants::http::DEFAULT_HEARTBEAT_GRACE_SECONDS
}

fn default_alert_sweep_seconds() -> u64 {
    crate::constants::intervals::ALERT_SWEEP_SECONDS
}

fn default_traffic_housekeeping_seconds() -> u64 {
    crate::constants::intervals::TRAFFIC_HOUSEKEEPING_SECONDS
}

fn default_overview_cache_ttl_seconds() -> i64 {
    crate::constants::cache::MONITOR_OVERVIEW_TTL_SECONDS
}

impl Config {
    pub fn validate(&self) -> Result<(), crate::errors::ConfigError> {
        if self.host.trim().is_empty() {
            return Err(crate::errors::ConfigError::MissingRequired {
                field: "host".to_string(),
            });
        }
        if self.tsdb_url.trim().is_empty() {
            return Err(crate::errors::ConfigError::MissingRequired {
                field: "tsdb_url".to_string(),
            });
        }
        if self.database_path.trim().is_empty() {
            return Err(crate::errors::ConfigError::MissingRequired {
                field: "database_path".to_string(),
            });
        }
        Ok(())
    }
}
