//! Per-probe and per-monitor latest-value snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::TtlMap;
use crate::constants::cache::{MONITOR_SNAPSHOT_TTL_SECONDS, PROBE_SNAPSHOT_TTL_SECONDS};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub usage_percent: f64,
    pub load_avg_1: Option<f64>,
    pub load_avg_5: Option<f64>,
    pub load_avg_15: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskSnapshot {
    pub mount_count: u32,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub upload_rate_bytes_per_sec: f64,
    pub download_rate_bytes_per_sec: f64,
    pub cumulative_recv_bytes: u64,
    pub cumulative_sent_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConnectionSnapshot {
    pub established: u32,
    pub listen: u32,
    pub time_wait: u32,
    pub close_wait: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub uptime_seconds: u64,
    pub os: String,
    pub kernel_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuSnapshot {
    pub index: u32,
    pub name: String,
    pub usage_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureSnapshot {
    pub sensor_key: String,
    pub sensor_label: String,
    pub celsius: f64,
}

/// A single synthetic-monitor observation, as last reported by one probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorData {
    pub monitor_id: String,
    pub monitor_type: String,
    pub target: String,
    pub status: String, // "up" | "down"
    pub response_time_ms: u64,
    pub http_status: Option<u16>,
    pub cert_expiry_ms: Option<i64>,
    pub cert_days_left: Option<i64>,
    pub error: Option<String>,
    pub checked_at_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeSnapshot {
    pub cpu: Option<CpuSnapshot>,
    pub memory: Option<MemorySnapshot>,
    pub disk: Option<DiskSnapshot>,
    pub network: Option<NetworkSnapshot>,
    pub network_connection: Option<NetworkConnectionSnapshot>,
    pub host: Option<HostSnapshot>,
    pub gpu: Vec<GpuSnapshot>,
    pub temperature: Vec<TemperatureSnapshot>,
    pub monitors: Vec<MonitorData>,
}

#[derive(Debug, Clone, Default)]
pub struct MonitorSnapshot {
    pub by_agent: HashMap<String, MonitorData>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStats {
    pub status: String, // "up" | "down" | "unknown"
    pub response_time_avg_ms: u64,
    pub cert_expiry_date: Option<i64>,
    pub cert_days_left: Option<i64>,
    pub agent_count: usize,
    pub last_check_time: Option<i64>,
}

/// Owns both latest-value maps: per-probe snapshots keyed by `agent_id`, and
/// per-monitor snapshots keyed by `monitor_id`.
pub struct LatestValueCache {
    probes: TtlMap<String, ProbeSnapshot>,
    monitors: TtlMap<String, MonitorSnapshotEntry>,
}

/// Internal representation kept in the monitor TtlMap; `MonitorSnapshot`
/// itself isn't `Clone`-cheap enough to store directly since `HashMap`
/// clones deep, so this wrapper is identical in shape but lives here to
/// keep the public type re-exportable without a cache-internal TTL field.
#[derive(Debug, Clone, Default)]
struct MonitorSnapshotEntry {
    by_agent: HashMap<String, MonitorData>,
    updated_at: DateTime<Utc>,
}

impl LatestValueCache {
    pub fn new() -> Self {
        Self {
            probes: TtlMap::new(PROBE_SNAPSHOT_TTL_SECONDS),
            monitors: TtlMap::new(MONITOR_SNAPSHOT_TTL_SECONDS),
        }
    }

    pub fn get_probe(&self, agent_id: &str) -> Option<ProbeSnapshot> {
        self.probes.get(&agent_id.to_string())
    }

    pub fn upsert_probe(&self, agent_id: &str, mutate: impl FnOnce(&mut ProbeSnapshot)) {
        let mut snapshot = self.probes.get(&agent_id.to_string()).unwrap_or_default();
        mutate(&mut snapshot);
        self.probes.set(agent_id.to_string(), snapshot);
    }

    pub fn remove_probe(&self, agent_id: &str) {
        self.probes.remove(&agent_id.to_string());
    }

    /// Returns the monitor snapshot along with whether it is past its TTL:
    /// a `(monitor_id, agent_id)` pair present here implies a recent sample
    /// OR the entry is stale.
    pub fn get_monitor_with_age(&self, monitor_id: &str) -> Option<(MonitorSnapshot, bool)> {
        self.monitors.get_with_age(&monitor_id.to_string()).map(|(entry, expired)| {
            (
                MonitorSnapshot {
                    by_agent: entry.by_agent,
                    updated_at: Some(entry.updated_at),
                },
                expired,
            )
        })
    }

    pub fn get_monitor(&self, monitor_id: &str) -> Option<MonitorSnapshot> {
        self.get_monitor_with_age(monitor_id).map(|(s, _)| s)
    }

    pub fn upsert_monitor(&self, monitor_id: &str, agent_id: &str, data: MonitorData) {
        let mut entry = self
            .monitors
            .get(&monitor_id.to_string())
            .unwrap_or_default();
        entry.by_agent.insert(agent_id.to_string(), data);
        entry.updated_at = Utc::now();
        self.monitors.set(monitor_id.to_string(), entry);
    }

    pub fn remove_monitor(&self, monitor_id: &str) {
        self.monitors.remove(&monitor_id.to_string());
    }

    pub fn all_monitor_ids(&self) -> Vec<String> {
        self.monitors.snapshot().into_iter().map(|(id, _)| id).collect()
    }

    /// Computes `MonitorStats` purely from the latest-value snapshot — never
    /// from the TSDB.
    pub fn monitor_stats(&self, monitor_id: &str) -> Option<MonitorStats> {
        let snapshot = self.get_monitor(monitor_id)?;
        if snapshot.by_agent.is_empty() {
            return None;
        }

        let any_up = snapshot.by_agent.values().any(|d| d.status == "up");
        let any_down = snapshot.by_agent.values().any(|d| d.status == "down");
        let status = if any_up {
            "up"
        } else if any_down {
            "down"
        } else {
            "unknown"
        };

        let response_times: Vec<u64> = snapshot.by_agent.values().map(|d| d.response_time_ms).collect();
        let response_time_avg_ms = if response_times.is_empty() {
            0
        } else {
            response_times.iter().sum::<u64>() / response_times.len() as u64
        };

        let cert_days_left = snapshot
            .by_agent
            .values()
            .filter_map(|d| d.cert_days_left)
            .min();
        let cert_expiry_date = snapshot
            .by_agent
            .values()
            .filter_map(|d| d.cert_expiry_ms)
            .min();

        let last_check_time = snapshot.by_agent.values().map(|d| d.checked_at_ms).max();

        Some(MonitorStats {
            status: status.to_string(),
            response_time_avg_ms,
            cert_expiry_date,
            cert_days_left,
            agent_count: snapshot.by_agent.len(),
            last_check_time,
        })
    }
}

impl Default for LatestValueCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_monitor_data(status: &str, response_time_ms: u64) -> MonitorData {
        MonitorData {
            monitor_id: "m1".to_string(),
            monitor_type: "http".to_string(),
            target: "https://example.com".to_string(),
            status: status.to_string(),
            response_time_ms,
            http_status: Some(200),
            cert_expiry_ms: None,
            cert_days_left: None,
            error: None,
            checked_at_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn monitor_stats_up_if_any_agent_up() {
        let cache = LatestValueCache::new();
        cache.upsert_monitor("m1", "a1", sample_monitor_data("down", 100));
        cache.upsert_monitor("m1", "a2", sample_monitor_data("up", 50));

        let stats = cache.monitor_stats("m1").unwrap();
        assert_eq!(stats.status, "up");
        assert_eq!(stats.agent_count, 2);
        assert_eq!(stats.response_time_avg_ms, 75);
    }

    #[test]
    fn monitor_stats_missing_entry_is_none() {
        let cache = LatestValueCache::new();
        assert!(cache.monitor_stats("nope").is_none());
    }

    #[test]
    fn probe_snapshot_upsert_replaces_dimension() {
        let cache = LatestValueCache::new();
        cache.upsert_probe("a1", |s| {
            s.cpu = Some(CpuSnapshot {
                usage_percent: 10.0,
                ..Default::default()
            });
        });
        cache.upsert_probe("a1", |s| {
            s.memory = Some(MemorySnapshot {
                used_bytes: 100,
                total_bytes: 200,
                usage_percent: 50.0,
            });
        });

        let snapshot = cache.get_probe("a1").unwrap();
        assert_eq!(snapshot.cpu.unwrap().usage_percent, 10.0);
        assert_eq!(snapshot.memory.unwrap().used_bytes, 100);
    }
}
