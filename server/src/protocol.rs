//! Probe wire protocol: JSON envelopes over the persistent bidirectional
//! channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generic envelope every frame is wrapped in, in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub data: Value,
}

impl Envelope {
    pub fn new(frame_type: impl Into<String>, data: Value) -> Self {
        Self {
            frame_type: frame_type.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterFrame {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub os: String,
    pub arch: String,
    pub version: String,
    pub api_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricFrame {
    pub metric_type: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshLoginEventFrame {
    pub username: String,
    pub source_ip: String,
    pub source_port: u16,
    pub status: String,
    pub tty: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshLoginConfigResultFrame {
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TamperEventFrame {
    pub path: String,
    pub operation: String,
    pub details: Option<String>,
    pub restored: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TamperAlertFrame {
    pub path: String,
    pub operation: String,
    pub details: Option<String>,
    pub restored: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandResponseFrame {
    pub command_id: String,
    pub success: bool,
    pub output: Option<String>,
}

/// Inbound frame tags the core must dispatch on.
pub mod inbound_tag {
    pub const REGISTER: &str = "register";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const METRIC: &str = "metric";
    pub const COMMAND_RESPONSE: &str = "command_response";
    pub const SSH_LOGIN_EVENT: &str = "ssh_login_event";
    pub const SSH_LOGIN_CONFIG_RESULT: &str = "ssh_login_config_result";
    pub const TAMPER_EVENT: &str = "tamper_event";
    pub const TAMPER_ALERT: &str = "tamper_alert";
}

/// Outbound frame tags the core pushes to probes.
pub mod outbound_tag {
    pub const MONITOR_CONFIG: &str = "monitor_config";
    pub const SSH_LOGIN_CONFIG: &str = "ssh_login_config";
    pub const TAMPER_PROTECT: &str = "tamper_protect";
    pub const COMMAND: &str = "command";
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorItem {
    pub id: String,
    #[serde(rename = "type")]
    pub monitor_type: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icmp: Option<Value>,
}

/// `interval` is reserved and unused — kept for wire compatibility with
/// probes that still read it.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorConfigPayload {
    pub interval: u64,
    pub items: Vec<MonitorItem>,
}

impl MonitorConfigPayload {
    pub fn new(items: Vec<MonitorItem>) -> Self {
        Self { interval: 0, items }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SshLoginConfigPayload {
    pub enabled: bool,
    pub allowlist: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TamperProtectPayload {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}
