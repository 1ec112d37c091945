//! Synthetic-monitor scheduler & config fan-out.
//!
//! One recurring job per enabled monitor, keyed by the job's own uuid so
//! `update`/`remove` can retarget or cancel it without disturbing the
//! others. Built on `tokio_cron_scheduler::JobScheduler`, driven by a plain
//! interval instead of a cron expression since monitor cadence is an
//! integer second count, not a calendar schedule.

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{LatestValueCache, TtlMap};
use crate::constants::cache::MONITOR_OVERVIEW_TTL_SECONDS;
use crate::constants::intervals::MIN_MONITOR_INTERVAL_SECONDS;
use crate::database::{AgentRecord, Database, MonitorTaskRecord, MonitorType, Visibility};
use crate::errors::MonitorError;
use crate::protocol::{outbound_tag, Envelope, MonitorConfigPayload, MonitorItem};
use crate::registry::ConnectionRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct MonitorOverviewItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: String,
    pub target: Option<String>,
    pub visibility: String,
    pub status: String,
    pub response_time_avg_ms: u64,
    pub cert_days_left: Option<i64>,
    pub cert_expiry_date: Option<i64>,
    pub agent_count: usize,
    pub last_check_time: Option<i64>,
}

pub struct MonitorScheduler {
    database: Arc<Database>,
    registry: Arc<ConnectionRegistry>,
    cache: Arc<LatestValueCache>,
    scheduler: JobScheduler,
    jobs: StdRwLock<HashMap<String, Uuid>>,
    overview_cache: TtlMap<bool, Vec<MonitorOverviewItem>>,
}

impl MonitorScheduler {
    pub async fn new(database: Arc<Database>, registry: Arc<ConnectionRegistry>, cache: Arc<LatestValueCache>) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("failed to create monitor job scheduler: {}", e))?;

        Ok(Self {
            database,
            registry,
            cache,
            scheduler,
            jobs: StdRwLock::new(HashMap::new()),
            overview_cache: TtlMap::new(MONITOR_OVERVIEW_TTL_SECONDS),
        })
    }

    /// Loads every enabled monitor and spawns its ticker, then starts the
    /// underlying job runtime. Call once at startup.
    pub async fn start(&self) -> Result<()> {
        let monitors = self.database.get_enabled_monitors().await?;
        for monitor in &monitors {
            self.spawn_job(monitor).await?;
        }
        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("failed to start monitor job scheduler: {}", e))?;
        info!(count = monitors.len(), "monitor scheduler started");
        Ok(())
    }

    async fn spawn_job(&self, monitor: &MonitorTaskRecord) -> Result<()> {
        if monitor.interval_seconds < MIN_MONITOR_INTERVAL_SECONDS {
            return Err(MonitorError::InvalidInterval {
                interval: monitor.interval_seconds,
            }
            .into());
        }

        let database = self.database.clone();
        let registry = self.registry.clone();
        let monitor_id = monitor.id.clone();
        let duration = Duration::from_secs(monitor.interval_seconds as u64);

        let job = Job::new_repeated_async(duration, move |_uuid, _scheduler| {
            let database = database.clone();
            let registry = registry.clone();
            let monitor_id = monitor_id.clone();
            Box::pin(async move {
                if let Err(e) = tick(&database, &registry, &monitor_id).await {
                    warn!(monitor_id, error = %e, "monitor tick failed");
                }
            })
        })
        .map_err(|e| anyhow!("failed to build monitor job for '{}': {}", monitor.id, e))?;

        let guid = job.guid();
        self.scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("failed to register monitor job for '{}': {}", monitor.id, e))?;

        self.jobs.write().expect("scheduler lock poisoned").insert(monitor.id.clone(), guid);
        Ok(())
    }

    /// Wired from monitor creation. Assumes the caller already persisted
    /// the monitor row.
    pub async fn add(&self, monitor_id: &str) -> Result<()> {
        let monitor = self
            .database
            .get_monitor_by_id(monitor_id)
            .await?
            .ok_or_else(|| MonitorError::NotFound {
                monitor_id: monitor_id.to_string(),
            })?;
        if monitor.enabled {
            self.spawn_job(&monitor).await?;
        }
        self.invalidate_overview_cache();
        Ok(())
    }

    /// Wired from monitor update (interval, enabled flag, or targeting
    /// change) — cancels the existing ticker and respawns from the fresh
    /// row.
    pub async fn update(&self, monitor_id: &str) -> Result<()> {
        self.cancel_job(monitor_id).await;
        let monitor = self
            .database
            .get_monitor_by_id(monitor_id)
            .await?
            .ok_or_else(|| MonitorError::NotFound {
                monitor_id: monitor_id.to_string(),
            })?;
        if monitor.enabled {
            self.spawn_job(&monitor).await?;
        }
        self.invalidate_overview_cache();
        Ok(())
    }

    /// Wired from monitor delete.
    pub async fn remove(&self, monitor_id: &str) -> Result<()> {
        self.cancel_job(monitor_id).await;
        self.invalidate_overview_cache();
        Ok(())
    }

    async fn cancel_job(&self, monitor_id: &str) {
        let guid = self.jobs.write().expect("scheduler lock poisoned").remove(monitor_id);
        if let Some(guid) = guid {
            if let Err(e) = self.scheduler.remove(&guid).await {
                warn!(monitor_id, error = %e, "failed to remove monitor job");
            }
        }
    }

    /// On probe connect, pushes the entire currently-assigned task set so a
    /// reconnect never runs checks against stale config.
    pub async fn on_probe_connect(&self, agent_id: &str) -> Result<()> {
        let Some(agent) = self.database.get_agent_by_id(agent_id).await? else {
            return Ok(());
        };

        let monitors = self.database.get_enabled_monitors().await?;
        let online_self = [agent];
        let items: Vec<MonitorItem> = monitors
            .iter()
            .filter(|monitor| resolve_targets(monitor, &online_self).iter().any(|id| id == agent_id))
            .map(monitor_item)
            .collect();

        if items.is_empty() {
            return Ok(());
        }

        let payload = MonitorConfigPayload::new(items);
        let envelope = Envelope::new(outbound_tag::MONITOR_CONFIG, serde_json::to_value(payload)?);
        if let Err(e) = self.registry.send(agent_id, envelope) {
            warn!(agent_id, error = %e, "failed to push monitor config set on connect");
        }
        Ok(())
    }

    fn invalidate_overview_cache(&self) {
        self.overview_cache.remove(&true);
        self.overview_cache.remove(&false);
    }

    /// Dashboard-facing overview list, cached ~5 minutes.
    pub async fn get_overview(&self, authenticated: bool) -> Result<Vec<MonitorOverviewItem>> {
        if let Some(cached) = self.overview_cache.get(&authenticated) {
            return Ok(cached);
        }

        let monitors = self.database.get_all_monitors().await?;
        let items: Vec<MonitorOverviewItem> = monitors
            .into_iter()
            .filter(|m| authenticated || matches!(m.visibility, Visibility::Public))
            .map(|m| self.overview_item(m, authenticated))
            .collect();

        self.overview_cache.set(authenticated, items.clone());
        Ok(items)
    }

    fn overview_item(&self, monitor: MonitorTaskRecord, authenticated: bool) -> MonitorOverviewItem {
        let stats = self.cache.monitor_stats(&monitor.id);
        let target = if authenticated || monitor.show_target_public {
            Some(monitor.target.clone())
        } else {
            None
        };

        MonitorOverviewItem {
            id: monitor.id,
            name: monitor.name,
            monitor_type: monitor.monitor_type.as_str().to_string(),
            target,
            visibility: monitor.visibility.as_str().to_string(),
            status: stats.as_ref().map(|s| s.status.clone()).unwrap_or_else(|| "unknown".to_string()),
            response_time_avg_ms: stats.as_ref().map(|s| s.response_time_avg_ms).unwrap_or(0),
            cert_days_left: stats.as_ref().and_then(|s| s.cert_days_left),
            cert_expiry_date: stats.as_ref().and_then(|s| s.cert_expiry_date),
            agent_count: stats.as_ref().map(|s| s.agent_count).unwrap_or(0),
            last_check_time: stats.as_ref().and_then(|s| s.last_check_time),
        }
    }
}

async fn tick(database: &Arc<Database>, registry: &Arc<ConnectionRegistry>, monitor_id: &str) -> Result<()> {
    let Some(monitor) = database.get_monitor_by_id(monitor_id).await? else {
        debug!(monitor_id, "tick for deleted monitor, skipping");
        return Ok(());
    };
    if !monitor.enabled {
        return Ok(());
    }

    let online_ids = registry.list_online();
    let mut online_agents = Vec::with_capacity(online_ids.len());
    for id in &online_ids {
        if let Some(agent) = database.get_agent_by_id(id).await? {
            online_agents.push(agent);
        }
    }

    let targets = resolve_targets(&monitor, &online_agents);
    if targets.is_empty() {
        return Ok(());
    }

    let item = monitor_item(&monitor);
    let payload = MonitorConfigPayload::new(vec![item]);
    let envelope = Envelope::new(outbound_tag::MONITOR_CONFIG, serde_json::to_value(payload)?);

    for agent_id in targets {
        // A send failure to one probe must not block the others.
        if let Err(e) = registry.send(&agent_id, envelope.clone()) {
            warn!(agent_id, monitor_id, error = %e, "failed to push monitor config");
        }
    }
    Ok(())
}

/// Target-probe resolution: the authoritative rule for which agents a
/// monitor task fans out to.
fn resolve_targets(monitor: &MonitorTaskRecord, online_agents: &[AgentRecord]) -> Vec<String> {
    if monitor.agent_ids.is_empty() && monitor.tags.is_empty() {
        return online_agents.iter().map(|a| a.id.clone()).collect();
    }

    online_agents
        .iter()
        .filter(|a| monitor.agent_ids.contains(&a.id) || a.tags.iter().any(|t| monitor.tags.contains(t)))
        .map(|a| a.id.clone())
        .collect()
}

fn monitor_item(monitor: &MonitorTaskRecord) -> MonitorItem {
    let (http, tcp, icmp) = match monitor.monitor_type {
        MonitorType::Http | MonitorType::Https => (Some(monitor.config.clone()), None, None),
        MonitorType::Tcp => (None, Some(monitor.config.clone()), None),
        MonitorType::Icmp => (None, None, Some(monitor.config.clone())),
    };

    MonitorItem {
        id: monitor.id.clone(),
        monitor_type: monitor.monitor_type.as_str().to_string(),
        target: monitor.target.clone(),
        http,
        tcp,
        icmp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn agent(id: &str, tags: &[&str]) -> AgentRecord {
        let now = Utc::now();
        AgentRecord {
            id: id.to_string(),
            name: id.to_string(),
            hostname: "host".to_string(),
            last_ip: None,
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            version: "1.0".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            visibility: Visibility::Public,
            weight: 0,
            expire_at: None,
            traffic_limit_bytes: None,
            traffic_reset_day: None,
            traffic_used_bytes: 0,
            traffic_period_start: None,
            traffic_baseline_recv: 0,
            traffic_alert_sent_80: false,
            traffic_alert_sent_90: false,
            traffic_alert_sent_100: false,
            ssh_login_enabled: false,
            ssh_login_allowlist: vec![],
            ssh_login_apply_status: crate::database::SshApplyStatus::Pending,
            ssh_login_apply_message: None,
            tamper_enabled: false,
            tamper_paths: vec![],
            last_seen_at: None,
            online: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn monitor(agent_ids: &[&str], tags: &[&str]) -> MonitorTaskRecord {
        let now = Utc::now();
        MonitorTaskRecord {
            id: "m1".to_string(),
            name: "m1".to_string(),
            monitor_type: MonitorType::Https,
            target: "https://example.com".to_string(),
            config: serde_json::json!({}),
            enabled: true,
            visibility: Visibility::Public,
            interval_seconds: 60,
            agent_ids: agent_ids.iter().map(|s| s.to_string()).collect(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            show_target_public: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn empty_agent_ids_and_tags_targets_all_online() {
        let m = monitor(&[], &[]);
        let online = vec![agent("a1", &[]), agent("a2", &[])];
        let targets = resolve_targets(&m, &online);
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn explicit_agent_id_targets_only_that_probe() {
        let m = monitor(&["a1"], &[]);
        let online = vec![agent("a1", &[]), agent("a2", &[])];
        assert_eq!(resolve_targets(&m, &online), vec!["a1".to_string()]);
    }

    #[test]
    fn tag_intersection_targets_matching_probes() {
        let m = monitor(&[], &["edge"]);
        let online = vec![agent("a1", &["edge"]), agent("a2", &["core"])];
        assert_eq!(resolve_targets(&m, &online), vec!["a1".to_string()]);
    }

    #[test]
    fn offline_probes_are_never_targeted() {
        let m = monitor(&["a1", "a2"], &[]);
        // Only a1 is in the online set passed in.
        let online = vec![agent("a1", &[])];
        assert_eq!(resolve_targets(&m, &online), vec!["a1".to_string()]);
    }
}
