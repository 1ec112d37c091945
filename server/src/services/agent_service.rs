//! Probe (agent) lifecycle: registration and cascading delete.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::cache::LatestValueCache;
use crate::database::{AgentRecord, Database, SshApplyStatus, Visibility};
use crate::ingest::MetricQuery;
use crate::protocol::{outbound_tag, Envelope, RegisterFrame, SshLoginConfigPayload, TamperProtectPayload};
use crate::registry::ConnectionRegistry;

pub struct AgentService {
    database: Arc<Database>,
    cache: Arc<LatestValueCache>,
    query: Arc<MetricQuery>,
    registry: Arc<ConnectionRegistry>,
}

impl AgentService {
    pub fn new(
        database: Arc<Database>,
        cache: Arc<LatestValueCache>,
        query: Arc<MetricQuery>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            database,
            cache,
            query,
            registry,
        }
    }

    /// Creates a probe on first successful registration, or updates the
    /// identity fields that can change without losing identity on every
    /// re-registration.
    pub async fn register(&self, frame: &RegisterFrame, source_ip: Option<&str>) -> Result<AgentRecord> {
        let now = Utc::now();
        let mut agent = match self.database.get_agent_by_id(&frame.id).await? {
            Some(existing) => existing,
            None => AgentRecord {
                id: frame.id.clone(),
                name: frame.name.clone(),
                hostname: frame.hostname.clone(),
                last_ip: None,
                os: frame.os.clone(),
                arch: frame.arch.clone(),
                version: frame.version.clone(),
                tags: vec![],
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
                ssh_login_apply_status: SshApplyStatus::Pending,
                ssh_login_apply_message: None,
                tamper_enabled: false,
                tamper_paths: vec![],
                last_seen_at: None,
                online: false,
                created_at: now,
                updated_at: now,
            },
        };

        agent.hostname = frame.hostname.clone();
        agent.os = frame.os.clone();
        agent.arch = frame.arch.clone();
        agent.version = frame.version.clone();
        agent.online = true;
        agent.last_seen_at = Some(now);
        if let Some(ip) = source_ip {
            agent.last_ip = Some(ip.to_string());
        }
        agent.updated_at = now;

        self.database.upsert_agent(&agent).await?;
        info!(agent_id = %agent.id, "probe registered");
        Ok(agent)
    }

    pub async fn mark_offline(&self, agent_id: &str) -> Result<()> {
        self.database.set_agent_online(agent_id, false, None, Utc::now()).await
    }

    /// Pushes the probe's current SSH-login allow-list and tamper-protect
    /// path set in a single `ssh_login_config` + `tamper_protect` pair, the
    /// way `MonitorScheduler::on_probe_connect` replays the full monitor
    /// set so a reconnect never runs against stale config.
    pub async fn push_config_on_connect(&self, agent: &AgentRecord) {
        let ssh_payload = SshLoginConfigPayload {
            enabled: agent.ssh_login_enabled,
            allowlist: agent.ssh_login_allowlist.clone(),
        };
        if let Ok(data) = serde_json::to_value(ssh_payload) {
            if let Err(e) = self
                .registry
                .send(&agent.id, Envelope::new(outbound_tag::SSH_LOGIN_CONFIG, data))
            {
                warn!(agent_id = %agent.id, error = %e, "failed to push ssh login config on connect");
            }
        }

        let added = if agent.tamper_enabled {
            agent.tamper_paths.clone()
        } else {
            vec![]
        };
        let tamper_payload = TamperProtectPayload { added, removed: vec![] };
        if let Ok(data) = serde_json::to_value(tamper_payload) {
            if let Err(e) = self
                .registry
                .send(&agent.id, Envelope::new(outbound_tag::TAMPER_PROTECT, data))
            {
                warn!(agent_id = %agent.id, error = %e, "failed to push tamper protect config on connect");
            }
        }
    }

    /// Updates the SSH-login allow-list/enabled flag and pushes the new
    /// config to the probe immediately if it is online.
    pub async fn update_ssh_login_config(
        &self,
        agent_id: &str,
        enabled: bool,
        allowlist: Vec<String>,
    ) -> Result<Option<AgentRecord>> {
        let Some(mut agent) = self.database.get_agent_by_id(agent_id).await? else {
            return Ok(None);
        };
        agent.ssh_login_enabled = enabled;
        agent.ssh_login_allowlist = allowlist;
        agent.ssh_login_apply_status = SshApplyStatus::Pending;
        agent.ssh_login_apply_message = None;
        agent.updated_at = Utc::now();
        self.database.upsert_agent(&agent).await?;

        if self.registry.is_online(agent_id) {
            let payload = SshLoginConfigPayload {
                enabled: agent.ssh_login_enabled,
                allowlist: agent.ssh_login_allowlist.clone(),
            };
            let envelope = Envelope::new(outbound_tag::SSH_LOGIN_CONFIG, serde_json::to_value(payload)?);
            if let Err(e) = self.registry.send(agent_id, envelope) {
                warn!(agent_id, error = %e, "failed to push updated ssh login config");
            }
        }
        Ok(Some(agent))
    }

    /// Updates the tamper-protect path set, diffs against the previous set
    /// so the probe only receives the delta, and persists the new set.
    /// Diffing against the stored set, not the wire history, makes repeated
    /// calls with the same input a no-op.
    pub async fn update_tamper_paths(
        &self,
        agent_id: &str,
        enabled: bool,
        paths: Vec<String>,
    ) -> Result<Option<AgentRecord>> {
        let Some(mut agent) = self.database.get_agent_by_id(agent_id).await? else {
            return Ok(None);
        };

        let previous: HashSet<String> = agent.tamper_paths.iter().cloned().collect();
        let next: HashSet<String> = paths.iter().cloned().collect();
        let added: Vec<String> = next.difference(&previous).cloned().collect();
        let removed: Vec<String> = previous.difference(&next).cloned().collect();

        agent.tamper_enabled = enabled;
        agent.tamper_paths = paths;
        agent.updated_at = Utc::now();
        self.database.upsert_agent(&agent).await?;

        if self.registry.is_online(agent_id) && (!added.is_empty() || !removed.is_empty()) {
            let payload = TamperProtectPayload { added, removed };
            let envelope = Envelope::new(outbound_tag::TAMPER_PROTECT, serde_json::to_value(payload)?);
            if let Err(e) = self.registry.send(agent_id, envelope) {
                warn!(agent_id, error = %e, "failed to push updated tamper protect config");
            }
        }
        Ok(Some(agent))
    }

    /// Deletes a probe and everything derived from it: TSDB series, alert
    /// records/states, ssh-login events, tamper events/alerts, the in-memory
    /// snapshot, and finally the probe row itself.
    pub async fn delete(&self, agent_id: &str) -> Result<bool> {
        if let Err(e) = self.query.delete_agent_series(agent_id).await {
            warn!(agent_id, error = %e, "failed to delete TSDB series for deleted probe");
        }
        self.database.delete_alert_records_for_agent(agent_id).await?;
        self.database.delete_ssh_login_events_for_agent(agent_id).await?;
        self.database.delete_tamper_records_for_agent(agent_id).await?;
        self.cache.remove_probe(agent_id);
        self.database.delete_agent(agent_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsdb::{Sample, Series, TsdbClient};
    use async_trait::async_trait;

    struct NoopTsdb;

    #[async_trait]
    impl TsdbClient for NoopTsdb {
        async fn write(&self, _samples: &[Sample]) -> Result<()> {
            Ok(())
        }
        async fn query_instant(&self, _promql: &str) -> Result<Vec<Series>> {
            Ok(vec![])
        }
        async fn query_range(&self, _promql: &str, _start_ms: i64, _end_ms: i64, _step_secs: u64) -> Result<Vec<Series>> {
            Ok(vec![])
        }
        async fn get_label_values(&self, _label: &str, _matches: &[&str]) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn delete_series(&self, _matches: &[&str]) -> Result<()> {
            Ok(())
        }
    }

    async fn harness() -> AgentService {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let database = Arc::new(Database::new(tmp.path().to_str().unwrap()).await.unwrap());
        let cache = Arc::new(LatestValueCache::new());
        let tsdb: Arc<dyn TsdbClient> = Arc::new(NoopTsdb);
        let query = Arc::new(MetricQuery::new(cache.clone(), tsdb));
        let registry = Arc::new(ConnectionRegistry::new());
        AgentService::new(database, cache, query, registry)
    }

    fn register_frame(id: &str) -> RegisterFrame {
        RegisterFrame {
            id: id.to_string(),
            name: format!("probe-{id}"),
            hostname: "host".to_string(),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            version: "1.0.0".to_string(),
            api_token: "tok".to_string(),
        }
    }

    #[tokio::test]
    async fn register_creates_then_updates_identity_fields() {
        let service = harness().await;
        let agent = service.register(&register_frame("p1"), Some("10.0.0.5")).await.unwrap();
        assert_eq!(agent.last_ip.as_deref(), Some("10.0.0.5"));
        assert!(agent.online);

        let agent = service.register(&register_frame("p1"), None).await.unwrap();
        assert_eq!(agent.last_ip.as_deref(), Some("10.0.0.5"));
    }

    #[tokio::test]
    async fn update_tamper_paths_diffs_against_previous_set() {
        let service = harness().await;
        service.register(&register_frame("p1"), None).await.unwrap();

        let agent = service
            .update_tamper_paths("p1", true, vec!["/etc/passwd".to_string(), "/etc/shadow".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agent.tamper_paths.len(), 2);

        // Applying the same set again must not change anything.
        let agent = service
            .update_tamper_paths("p1", true, vec!["/etc/passwd".to_string(), "/etc/shadow".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agent.tamper_paths.len(), 2);

        let agent = service
            .update_tamper_paths("p1", true, vec!["/etc/shadow".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agent.tamper_paths, vec!["/etc/shadow".to_string()]);
    }

    #[tokio::test]
    async fn update_ssh_login_config_on_unknown_agent_returns_none() {
        let service = harness().await;
        let result = service.update_ssh_login_config("missing", true, vec![]).await.unwrap();
        assert!(result.is_none());
    }
}
