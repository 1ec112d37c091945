//! Alert configuration (§3 "Alert configuration"): a single global record
//! with per-rule toggles and thresholds+durations, persisted in the
//! property KV table under `ALERT_CONFIG_PROPERTY_KEY`.

use serde::{Deserialize, Serialize};

pub const ALERT_CONFIG_PROPERTY_KEY: &str = "alert_config";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRuleConfig {
    pub enabled: bool,
    pub threshold: f64,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertRuleConfig {
    pub enabled: bool,
    pub days_left_threshold: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRuleConfig {
    pub enabled: bool,
    pub down_seconds_threshold: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOfflineRuleConfig {
    pub enabled: bool,
    pub offline_seconds_threshold: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficRuleConfig {
    pub enabled: bool,
}

/// Rule tags, addressable by a short type tag per §3.
pub mod rule_tag {
    pub const CPU: &str = "cpu";
    pub const MEMORY: &str = "memory";
    pub const DISK: &str = "disk";
    pub const NETWORK: &str = "network";
    pub const CERT: &str = "cert";
    pub const SERVICE: &str = "service";
    pub const AGENT_OFFLINE: &str = "agent_offline";
    pub const TRAFFIC: &str = "traffic";
    pub const SSH_LOGIN: &str = "ssh_login";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Global gate: if false, every rule evaluation no-ops (§4.4).
    pub enabled: bool,
    pub cpu: ResourceRuleConfig,
    pub memory: ResourceRuleConfig,
    pub disk: ResourceRuleConfig,
    /// Network threshold is expressed in MB/s.
    pub network: ResourceRuleConfig,
    pub cert: CertRuleConfig,
    pub service: ServiceRuleConfig,
    pub agent_offline: AgentOfflineRuleConfig,
    pub traffic: TrafficRuleConfig,
}

impl Default for AlertConfig {
    fn default() -> Self {
        use crate::constants::alerts::{CERT_CRITICAL_DAYS, CERT_WARNING_DAYS};
        let _ = (CERT_CRITICAL_DAYS, CERT_WARNING_DAYS); // level thresholds, not config thresholds
        Self {
            enabled: true,
            cpu: ResourceRuleConfig {
                enabled: true,
                threshold: 80.0,
                duration_seconds: 60,
            },
            memory: ResourceRuleConfig {
                enabled: true,
                threshold: 85.0,
                duration_seconds: 60,
            },
            disk: ResourceRuleConfig {
                enabled: true,
                threshold: 90.0,
                duration_seconds: 300,
            },
            network: ResourceRuleConfig {
                enabled: true,
                threshold: 100.0,
                duration_seconds: 60,
            },
            cert: CertRuleConfig {
                enabled: true,
                days_left_threshold: 30,
            },
            service: ServiceRuleConfig {
                enabled: true,
                down_seconds_threshold: 60,
            },
            agent_offline: AgentOfflineRuleConfig {
                enabled: true,
                offline_seconds_threshold: 300,
            },
            traffic: TrafficRuleConfig { enabled: true },
        }
    }
}
