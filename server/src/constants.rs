//! Central repository for configuration constants and magic numbers.
//!
//! Organized by category to provide a single source of truth for timeouts,
//! intervals, thresholds, and limits used throughout the server core.

#![allow(dead_code)] // Some constants are defined for future use

use std::time::Duration;

/// HTTP / transport timeout constants
pub mod http {
    use super::Duration;

    /// Timeout for TSDB adapter requests
    pub const TSDB_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    /// Timeout for establishing HTTP connections
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Heartbeat grace period before a probe session is considered dead.
    /// This is the fallback default when no config override is supplied.
    pub const DEFAULT_HEARTBEAT_GRACE_SECONDS: u64 = 90;
}

/// Cache TTLs (latest-value caches and the monitor overview cache)
pub mod cache {
    /// TTL for the per-probe latest-value snapshot
    pub const PROBE_SNAPSHOT_TTL_SECONDS: i64 = 5 * 60;

    /// TTL for the per-monitor latest-value snapshot
    pub const MONITOR_SNAPSHOT_TTL_SECONDS: i64 = 5 * 60;

    /// TTL for the dashboard monitor-overview cache (authenticated/public)
    pub const MONITOR_OVERVIEW_TTL_SECONDS: i64 = 5 * 60;
}

/// Scheduler / housekeeping intervals
pub mod intervals {
    /// Minimum allowed monitor interval in seconds
    pub const MIN_MONITOR_INTERVAL_SECONDS: i64 = 10;

    /// Traffic accounting housekeeping tick (rollover check)
    pub const TRAFFIC_HOUSEKEEPING_SECONDS: u64 = 60;

    /// Alert engine sweep tick (cert / service-down / agent-offline)
    pub const ALERT_SWEEP_SECONDS: u64 = 15;
}

/// Alert engine constants
pub mod alerts {
    /// Resource-rule level boundaries: diff = value - threshold
    pub const LEVEL_INFO_MAX_DIFF: f64 = 20.0;
    pub const LEVEL_WARNING_MAX_DIFF: f64 = 50.0;

    /// Certificate-expiry level boundaries (days left)
    pub const CERT_CRITICAL_DAYS: i64 = 7;
    pub const CERT_WARNING_DAYS: i64 = 30;

    /// Traffic usage thresholds, evaluated in ascending order
    pub const TRAFFIC_THRESHOLDS: [u8; 3] = [80, 90, 100];

    /// Notification dispatch deadline; the fire/resolve path never awaits
    /// this directly.
    pub const NOTIFICATION_TIMEOUT_SECONDS: u64 = 30;
}

/// Wire-protocol / registry defaults
pub mod registry {
    /// Bounded write-mailbox capacity per probe session
    pub const SESSION_MAILBOX_CAPACITY: usize = 64;
}
