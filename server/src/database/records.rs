//! Database record types (entities).
//!
//! This module contains all the record structs used by the relational
//! store. JSON-ish list/set fields (tags, allow-lists, protected paths) are
//! stored as TEXT columns holding a `serde_json` array rather than
//! normalizing them into join tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Probes (agents)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "private" => Visibility::Private,
            _ => Visibility::Public,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SshApplyStatus {
    Pending,
    Success,
    Failed,
}

impl SshApplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SshApplyStatus::Pending => "pending",
            SshApplyStatus::Success => "success",
            SshApplyStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => SshApplyStatus::Success,
            "failed" => SshApplyStatus::Failed,
            _ => SshApplyStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub last_ip: Option<String>,
    pub os: String,
    pub arch: String,
    pub version: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub weight: i64,
    pub expire_at: Option<DateTime<Utc>>,

    // Traffic policy
    pub traffic_limit_bytes: Option<i64>,
    pub traffic_reset_day: Option<i32>,
    pub traffic_used_bytes: i64,
    pub traffic_period_start: Option<DateTime<Utc>>,
    pub traffic_baseline_recv: i64,
    pub traffic_alert_sent_80: bool,
    pub traffic_alert_sent_90: bool,
    pub traffic_alert_sent_100: bool,

    // Embedded SSH-login config
    pub ssh_login_enabled: bool,
    pub ssh_login_allowlist: Vec<String>,
    pub ssh_login_apply_status: SshApplyStatus,
    pub ssh_login_apply_message: Option<String>,

    // Embedded tamper-protect config
    pub tamper_enabled: bool,
    pub tamper_paths: Vec<String>,

    pub last_seen_at: Option<DateTime<Utc>>,
    pub online: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    /// True if `source_ip` is permitted by this probe's SSH-login
    /// allow-list. A login from an IP not in the allow-list fires a
    /// one-shot notice. Entries may be bare IPs or CIDR blocks
    /// (`10.0.0.0/8`); an empty allow-list permits nothing.
    pub fn allows_ssh_source(&self, source_ip: &str) -> bool {
        let candidate: Option<std::net::IpAddr> = source_ip.parse().ok();
        self.ssh_login_allowlist.iter().any(|entry| {
            if let (Some(candidate), Ok(net)) = (candidate, entry.parse::<ipnet::IpNet>()) {
                net.contains(&candidate)
            } else {
                entry == source_ip
            }
        })
    }
}

/// Fields accepted when creating or updating a probe via registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentRegistration {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub os: String,
    pub arch: String,
    pub version: String,
    pub source_ip: Option<String>,
}

// ============================================================================
// API tokens
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTokenRecord {
    pub token: String,
    pub name: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Monitor tasks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorType {
    Http,
    Https,
    Tcp,
    Icmp,
}

impl MonitorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorType::Http => "http",
            MonitorType::Https => "https",
            MonitorType::Tcp => "tcp",
            MonitorType::Icmp => "icmp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(MonitorType::Http),
            "https" => Some(MonitorType::Https),
            "tcp" => Some(MonitorType::Tcp),
            "icmp" => Some(MonitorType::Icmp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorTaskRecord {
    pub id: String,
    pub name: String,
    pub monitor_type: MonitorType,
    pub target: String,
    /// Type-specific config blob (HTTP method/headers/body/expected-status,
    /// TCP timeout, ICMP count+timeout) — stored as opaque JSON, interpreted
    /// by the scheduler fan-out and by the probe itself.
    pub config: serde_json::Value,
    pub enabled: bool,
    pub visibility: Visibility,
    pub interval_seconds: i64,
    pub agent_ids: Vec<String>,
    pub tags: Vec<String>,
    pub show_target_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "warning" => AlertLevel::Warning,
            "critical" => AlertLevel::Critical,
            _ => AlertLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    Firing,
    Resolved,
    Notice,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Notice => "notice",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "resolved" => AlertStatus::Resolved,
            "notice" => AlertStatus::Notice,
            _ => AlertStatus::Firing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecordRow {
    pub id: i64,
    pub agent_id: String,
    pub agent_name: String,
    pub rule_tag: String,
    pub subject_id: String,
    pub message: String,
    pub threshold: f64,
    pub actual_value: f64,
    pub level: AlertLevel,
    pub status: AlertStatus,
    pub fired_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted alert-state-machine row, keyed by `(agent_id, rule_tag,
/// subject_id)`. `key` is the precomputed `state_key()` string so lookups
/// don't need a composite-key query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStateRow {
    pub key: String,
    pub agent_id: String,
    pub rule_tag: String,
    pub subject_id: String,
    pub threshold: f64,
    pub duration_seconds: i64,
    pub last_value: f64,
    pub last_check_ms: i64,
    pub start_time_ms: i64,
    pub is_firing: bool,
    pub last_record_id: i64,
}

// ============================================================================
// SSH-login events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SshLoginStatus {
    Success,
    Failed,
}

impl SshLoginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SshLoginStatus::Success => "success",
            SshLoginStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => SshLoginStatus::Success,
            _ => SshLoginStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshLoginEventRecord {
    pub id: i64,
    pub agent_id: String,
    pub username: String,
    pub source_ip: String,
    pub source_port: i32,
    pub status: SshLoginStatus,
    pub tty: Option<String>,
    pub session_id: Option<String>,
    pub event_time: DateTime<Utc>,
}

// ============================================================================
// Tamper-protect events/alerts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TamperEventRecord {
    pub id: i64,
    pub agent_id: String,
    pub path: String,
    pub operation: String,
    pub details: Option<String>,
    pub restored: bool,
    pub event_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TamperAlertRecord {
    pub id: i64,
    pub agent_id: String,
    pub path: String,
    pub operation: String,
    pub details: Option<String>,
    pub restored: bool,
    pub event_time: DateTime<Utc>,
}

// ============================================================================
// Property KV (alert config, notification channels, public-IP config)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
