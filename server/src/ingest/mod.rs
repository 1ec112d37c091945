//! Metric ingest & query adapter.
//!
//! `MetricIngest` is the write side: probe payloads in, a cache upsert and a
//! TSDB write out, with network samples additionally routed to the traffic
//! accounter. `MetricQuery` (in `query.rs`) is the read side used by the
//! dashboard-facing handlers.

pub mod query;

pub use query::MetricQuery;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::cache::latest::{
    CpuSnapshot, DiskSnapshot, GpuSnapshot, HostSnapshot, MemorySnapshot, MonitorData,
    NetworkConnectionSnapshot, NetworkSnapshot, TemperatureSnapshot,
};
use crate::cache::LatestValueCache;
use crate::traffic::TrafficAccounter;
use crate::tsdb::{Sample, TsdbClient};

/// Closed set of metric types the wire protocol carries.
pub mod metric_type {
    pub const CPU: &str = "cpu";
    pub const MEMORY: &str = "memory";
    pub const DISK: &str = "disk";
    pub const NETWORK: &str = "network";
    pub const NETWORK_CONNECTION: &str = "network_connection";
    pub const DISK_IO: &str = "disk_io";
    pub const HOST: &str = "host";
    pub const GPU: &str = "gpu";
    pub const TEMPERATURE: &str = "temperature";
    pub const MONITOR: &str = "monitor";
}

pub struct MetricIngest {
    cache: Arc<LatestValueCache>,
    tsdb: Arc<dyn TsdbClient>,
    traffic: Arc<TrafficAccounter>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn sample(name: &str, agent_id: &str, value: f64, extra: &[(&str, &str)]) -> Sample {
    let mut labels = std::collections::HashMap::new();
    labels.insert("__name__".to_string(), format!("pika_{name}"));
    labels.insert("agent_id".to_string(), agent_id.to_string());
    for (k, v) in extra {
        labels.insert((*k).to_string(), (*v).to_string());
    }
    Sample {
        labels,
        value,
        ts_ms: now_ms(),
    }
}

#[derive(Debug, Deserialize)]
struct CpuPayload {
    usage_percent: f64,
    #[serde(default)]
    load_avg_1: Option<f64>,
    #[serde(default)]
    load_avg_5: Option<f64>,
    #[serde(default)]
    load_avg_15: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MemoryPayload {
    used_bytes: u64,
    total_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct DiskEntry {
    mount_point: String,
    total_bytes: u64,
    used_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct DiskPayload {
    disks: Vec<DiskEntry>,
}

#[derive(Debug, Deserialize)]
struct NetworkPayload {
    interface: String,
    upload_rate_bytes_per_sec: f64,
    download_rate_bytes_per_sec: f64,
    cumulative_recv_bytes: u64,
    cumulative_sent_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct NetworkConnectionPayload {
    established: u32,
    listen: u32,
    time_wait: u32,
    close_wait: u32,
}

#[derive(Debug, Deserialize)]
struct DiskIoEntry {
    device: String,
    read_bytes_per_sec: f64,
    write_bytes_per_sec: f64,
}

#[derive(Debug, Deserialize)]
struct DiskIoPayload {
    devices: Vec<DiskIoEntry>,
}

#[derive(Debug, Deserialize)]
struct HostPayload {
    uptime_seconds: u64,
    os: String,
    #[serde(default)]
    kernel_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GpuEntry {
    index: u32,
    name: String,
    usage_percent: f64,
    memory_used_bytes: u64,
    memory_total_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct GpuPayload {
    gpus: Vec<GpuEntry>,
}

#[derive(Debug, Deserialize)]
struct TemperatureEntry {
    sensor_key: String,
    sensor_label: String,
    celsius: f64,
}

#[derive(Debug, Deserialize)]
struct TemperaturePayload {
    sensors: Vec<TemperatureEntry>,
}

#[derive(Debug, Deserialize)]
struct MonitorPayload {
    monitor_id: String,
    monitor_type: String,
    target: String,
    status: String,
    response_time_ms: u64,
    #[serde(default)]
    http_status: Option<u16>,
    #[serde(default)]
    cert_expiry_ms: Option<i64>,
    #[serde(default)]
    cert_days_left: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

impl MetricIngest {
    pub fn new(
        cache: Arc<LatestValueCache>,
        tsdb: Arc<dyn TsdbClient>,
        traffic: Arc<TrafficAccounter>,
    ) -> Self {
        Self { cache, tsdb, traffic }
    }

    /// Decodes, caches, and writes one metric frame. Cache updates always
    /// land even if the subsequent TSDB write fails — a transient write
    /// failure for one metric type must not roll back the cache or stop
    /// any other frame from being processed.
    pub async fn ingest(&self, agent_id: &str, metric_type: &str, payload: Value) -> Result<()> {
        let samples = match metric_type {
            metric_type::CPU => self.ingest_cpu(agent_id, payload)?,
            metric_type::MEMORY => self.ingest_memory(agent_id, payload)?,
            metric_type::DISK => self.ingest_disk(agent_id, payload)?,
            metric_type::NETWORK => self.ingest_network(agent_id, payload).await?,
            metric_type::NETWORK_CONNECTION => self.ingest_network_connection(agent_id, payload)?,
            metric_type::DISK_IO => self.ingest_disk_io(agent_id, payload)?,
            metric_type::HOST => self.ingest_host(agent_id, payload)?,
            metric_type::GPU => self.ingest_gpu(agent_id, payload)?,
            metric_type::TEMPERATURE => self.ingest_temperature(agent_id, payload)?,
            metric_type::MONITOR => self.ingest_monitor(agent_id, payload)?,
            other => return Err(anyhow!("unsupported metric_type '{}'", other)),
        };

        if let Err(e) = self.tsdb.write(&samples).await {
            error!(agent_id, metric_type, error = %e, "tsdb write failed for metric frame");
            return Err(e);
        }
        Ok(())
    }

    fn ingest_cpu(&self, agent_id: &str, payload: Value) -> Result<Vec<Sample>> {
        let p: CpuPayload = serde_json::from_value(payload)?;
        self.cache.upsert_probe(agent_id, |s| {
            s.cpu = Some(CpuSnapshot {
                usage_percent: p.usage_percent,
                load_avg_1: p.load_avg_1,
                load_avg_5: p.load_avg_5,
                load_avg_15: p.load_avg_15,
            });
        });
        Ok(vec![sample("cpu_usage_percent", agent_id, p.usage_percent, &[])])
    }

    fn ingest_memory(&self, agent_id: &str, payload: Value) -> Result<Vec<Sample>> {
        let p: MemoryPayload = serde_json::from_value(payload)?;
        let usage_percent = if p.total_bytes > 0 {
            p.used_bytes as f64 * 100.0 / p.total_bytes as f64
        } else {
            0.0
        };
        self.cache.upsert_probe(agent_id, |s| {
            s.memory = Some(MemorySnapshot {
                used_bytes: p.used_bytes,
                total_bytes: p.total_bytes,
                usage_percent,
            });
        });
        Ok(vec![
            sample("memory_used_bytes", agent_id, p.used_bytes as f64, &[]),
            sample("memory_usage_percent", agent_id, usage_percent, &[]),
        ])
    }

    fn ingest_disk(&self, agent_id: &str, payload: Value) -> Result<Vec<Sample>> {
        let p: DiskPayload = serde_json::from_value(payload)?;
        let total_bytes: u64 = p.disks.iter().map(|d| d.total_bytes).sum();
        let used_bytes: u64 = p.disks.iter().map(|d| d.used_bytes).sum();
        let usage_percent = if total_bytes > 0 {
            used_bytes as f64 * 100.0 / total_bytes as f64
        } else {
            0.0
        };
        self.cache.upsert_probe(agent_id, |s| {
            s.disk = Some(DiskSnapshot {
                mount_count: p.disks.len() as u32,
                total_bytes,
                used_bytes,
                usage_percent,
            });
        });

        let mut samples = Vec::with_capacity(p.disks.len() * 2);
        for disk in &p.disks {
            let disk_usage = if disk.total_bytes > 0 {
                disk.used_bytes as f64 * 100.0 / disk.total_bytes as f64
            } else {
                0.0
            };
            samples.push(sample(
                "disk_usage_percent",
                agent_id,
                disk_usage,
                &[("mount_point", &disk.mount_point)],
            ));
            samples.push(sample(
                "disk_used_bytes",
                agent_id,
                disk.used_bytes as f64,
                &[("mount_point", &disk.mount_point)],
            ));
        }
        Ok(samples)
    }

    async fn ingest_network(&self, agent_id: &str, payload: Value) -> Result<Vec<Sample>> {
        let p: NetworkPayload = serde_json::from_value(payload)?;
        self.cache.upsert_probe(agent_id, |s| {
            s.network = Some(NetworkSnapshot {
                upload_rate_bytes_per_sec: p.upload_rate_bytes_per_sec,
                download_rate_bytes_per_sec: p.download_rate_bytes_per_sec,
                cumulative_recv_bytes: p.cumulative_recv_bytes,
                cumulative_sent_bytes: p.cumulative_sent_bytes,
            });
        });

        // Side-effect: feed the traffic accounter with cumulative received
        // bytes. Logged, not fatal — a traffic-accounting hiccup must not
        // drop the metric sample itself.
        if let Err(e) = self
            .traffic
            .on_network_sample(agent_id, p.cumulative_recv_bytes as i64)
            .await
        {
            warn!(agent_id, error = %e, "traffic accounting failed for network sample");
        }

        Ok(vec![
            sample(
                "network_sent_bytes_rate",
                agent_id,
                p.upload_rate_bytes_per_sec,
                &[("interface", &p.interface)],
            ),
            sample(
                "network_recv_bytes_rate",
                agent_id,
                p.download_rate_bytes_per_sec,
                &[("interface", &p.interface)],
            ),
            sample(
                "network_recv_bytes_total",
                agent_id,
                p.cumulative_recv_bytes as f64,
                &[("interface", &p.interface)],
            ),
            sample(
                "network_sent_bytes_total",
                agent_id,
                p.cumulative_sent_bytes as f64,
                &[("interface", &p.interface)],
            ),
        ])
    }

    fn ingest_network_connection(&self, agent_id: &str, payload: Value) -> Result<Vec<Sample>> {
        let p: NetworkConnectionPayload = serde_json::from_value(payload)?;
        self.cache.upsert_probe(agent_id, |s| {
            s.network_connection = Some(NetworkConnectionSnapshot {
                established: p.established,
                listen: p.listen,
                time_wait: p.time_wait,
                close_wait: p.close_wait,
            });
        });
        Ok(vec![
            sample(
                "network_connection_count",
                agent_id,
                p.established as f64,
                &[("state", "established")],
            ),
            sample(
                "network_connection_count",
                agent_id,
                p.listen as f64,
                &[("state", "listen")],
            ),
            sample(
                "network_connection_count",
                agent_id,
                p.time_wait as f64,
                &[("state", "time_wait")],
            ),
            sample(
                "network_connection_count",
                agent_id,
                p.close_wait as f64,
                &[("state", "close_wait")],
            ),
        ])
    }

    fn ingest_disk_io(&self, agent_id: &str, payload: Value) -> Result<Vec<Sample>> {
        let p: DiskIoPayload = serde_json::from_value(payload)?;
        let mut samples = Vec::with_capacity(p.devices.len() * 2);
        for d in &p.devices {
            samples.push(sample(
                "disk_io_read_bytes_rate",
                agent_id,
                d.read_bytes_per_sec,
                &[("device", &d.device)],
            ));
            samples.push(sample(
                "disk_io_write_bytes_rate",
                agent_id,
                d.write_bytes_per_sec,
                &[("device", &d.device)],
            ));
        }
        Ok(samples)
    }

    fn ingest_host(&self, agent_id: &str, payload: Value) -> Result<Vec<Sample>> {
        let p: HostPayload = serde_json::from_value(payload)?;
        self.cache.upsert_probe(agent_id, |s| {
            s.host = Some(HostSnapshot {
                uptime_seconds: p.uptime_seconds,
                os: p.os.clone(),
                kernel_version: p.kernel_version.clone(),
            });
        });
        Ok(vec![sample(
            "host_uptime_seconds",
            agent_id,
            p.uptime_seconds as f64,
            &[],
        )])
    }

    fn ingest_gpu(&self, agent_id: &str, payload: Value) -> Result<Vec<Sample>> {
        let p: GpuPayload = serde_json::from_value(payload)?;
        let snapshots: Vec<GpuSnapshot> = p
            .gpus
            .iter()
            .map(|g| GpuSnapshot {
                index: g.index,
                name: g.name.clone(),
                usage_percent: g.usage_percent,
                memory_used_bytes: g.memory_used_bytes,
                memory_total_bytes: g.memory_total_bytes,
            })
            .collect();
        self.cache.upsert_probe(agent_id, |s| {
            s.gpu = snapshots.clone();
        });

        let mut samples = Vec::with_capacity(p.gpus.len() * 2);
        for g in &p.gpus {
            let idx = g.index.to_string();
            samples.push(sample(
                "gpu_usage_percent",
                agent_id,
                g.usage_percent,
                &[("gpu_index", &idx), ("gpu_name", &g.name)],
            ));
            let mem_percent = if g.memory_total_bytes > 0 {
                g.memory_used_bytes as f64 * 100.0 / g.memory_total_bytes as f64
            } else {
                0.0
            };
            samples.push(sample(
                "gpu_memory_usage_percent",
                agent_id,
                mem_percent,
                &[("gpu_index", &idx), ("gpu_name", &g.name)],
            ));
        }
        Ok(samples)
    }

    fn ingest_temperature(&self, agent_id: &str, payload: Value) -> Result<Vec<Sample>> {
        let p: TemperaturePayload = serde_json::from_value(payload)?;
        let snapshots: Vec<TemperatureSnapshot> = p
            .sensors
            .iter()
            .map(|s| TemperatureSnapshot {
                sensor_key: s.sensor_key.clone(),
                sensor_label: s.sensor_label.clone(),
                celsius: s.celsius,
            })
            .collect();
        self.cache.upsert_probe(agent_id, |s| {
            s.temperature = snapshots.clone();
        });

        Ok(p.sensors
            .iter()
            .map(|s| {
                sample(
                    "temperature_celsius",
                    agent_id,
                    s.celsius,
                    &[("sensor_key", &s.sensor_key), ("sensor_label", &s.sensor_label)],
                )
            })
            .collect())
    }

    fn ingest_monitor(&self, agent_id: &str, payload: Value) -> Result<Vec<Sample>> {
        let p: MonitorPayload = serde_json::from_value(payload)?;
        let checked_at_ms = now_ms();
        let data = MonitorData {
            monitor_id: p.monitor_id.clone(),
            monitor_type: p.monitor_type.clone(),
            target: p.target.clone(),
            status: p.status.clone(),
            response_time_ms: p.response_time_ms,
            http_status: p.http_status,
            cert_expiry_ms: p.cert_expiry_ms,
            cert_days_left: p.cert_days_left,
            error: p.error.clone(),
            checked_at_ms,
        };

        self.cache.upsert_probe(agent_id, |s| {
            s.monitors.retain(|m| m.monitor_id != p.monitor_id);
            s.monitors.push(data.clone());
        });
        self.cache.upsert_monitor(&p.monitor_id, agent_id, data);

        let status_value = if p.status == "up" { 1.0 } else { 0.0 };
        let mut samples = vec![
            sample(
                "monitor_status",
                agent_id,
                status_value,
                &[
                    ("monitor_id", &p.monitor_id),
                    ("monitor_type", &p.monitor_type),
                    ("target", &p.target),
                    ("status", &p.status),
                ],
            ),
            sample(
                "monitor_response_time_ms",
                agent_id,
                p.response_time_ms as f64,
                &[
                    ("monitor_id", &p.monitor_id),
                    ("monitor_type", &p.monitor_type),
                    ("target", &p.target),
                ],
            ),
        ];
        if let Some(days_left) = p.cert_days_left {
            samples.push(sample(
                "monitor_cert_days_left",
                agent_id,
                days_left as f64,
                &[("monitor_id", &p.monitor_id), ("target", &p.target)],
            ));
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::traffic::TrafficAccounter;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingTsdb {
        writes: Mutex<Vec<Sample>>,
    }

    #[async_trait]
    impl TsdbClient for RecordingTsdb {
        async fn write(&self, samples: &[Sample]) -> Result<()> {
            self.writes.lock().unwrap().extend_from_slice(samples);
            Ok(())
        }
        async fn query_instant(&self, _promql: &str) -> Result<Vec<crate::tsdb::Series>> {
            Ok(vec![])
        }
        async fn query_range(
            &self,
            _promql: &str,
            _start_ms: i64,
            _end_ms: i64,
            _step_secs: u64,
        ) -> Result<Vec<crate::tsdb::Series>> {
            Ok(vec![])
        }
        async fn get_label_values(&self, _label: &str, _matches: &[&str]) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn delete_series(&self, _matches: &[&str]) -> Result<()> {
            Ok(())
        }
    }

    async fn harness() -> (Arc<LatestValueCache>, MetricIngest) {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(tmp.path().to_str().unwrap()).await.unwrap());
        let cache = Arc::new(LatestValueCache::new());
        let tsdb: Arc<dyn TsdbClient> = Arc::new(RecordingTsdb {
            writes: Mutex::new(vec![]),
        });
        let traffic = Arc::new(TrafficAccounter::new(db.clone(), None));
        (cache.clone(), MetricIngest::new(cache, tsdb, traffic))
    }

    #[tokio::test]
    async fn cpu_ingest_updates_cache_and_writes_sample() {
        let (cache, ingest) = harness().await;
        ingest
            .ingest("a1", "cpu", serde_json::json!({"usage_percent": 42.5}))
            .await
            .unwrap();

        let snapshot = cache.get_probe("a1").unwrap();
        assert_eq!(snapshot.cpu.unwrap().usage_percent, 42.5);
    }

    #[tokio::test]
    async fn unsupported_metric_type_is_rejected() {
        let (_cache, ingest) = harness().await;
        let err = ingest.ingest("a1", "weather", serde_json::json!({})).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn monitor_ingest_populates_both_cache_maps() {
        let (cache, ingest) = harness().await;
        ingest
            .ingest(
                "a1",
                "monitor",
                serde_json::json!({
                    "monitor_id": "m1",
                    "monitor_type": "http",
                    "target": "https://example.com",
                    "status": "up",
                    "response_time_ms": 120
                }),
            )
            .await
            .unwrap();

        let probe_snapshot = cache.get_probe("a1").unwrap();
        assert_eq!(probe_snapshot.monitors.len(), 1);

        let monitor_snapshot = cache.get_monitor("m1").unwrap();
        assert_eq!(monitor_snapshot.by_agent.get("a1").unwrap().status, "up");
    }
}
