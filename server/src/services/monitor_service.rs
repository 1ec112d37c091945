//! Monitor task CRUD, orchestrating the relational row and the scheduler
//! fan-out that must stay in lock-step with it.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use crate::constants::intervals::MIN_MONITOR_INTERVAL_SECONDS;
use crate::database::{Database, MonitorTaskRecord, MonitorType, Visibility};
use crate::ingest::MetricQuery;
use crate::scheduler::{MonitorOverviewItem, MonitorScheduler};

pub struct NewMonitor {
    pub name: String,
    pub monitor_type: MonitorType,
    pub target: String,
    pub config: serde_json::Value,
    pub visibility: Visibility,
    pub interval_seconds: i64,
    pub agent_ids: Vec<String>,
    pub tags: Vec<String>,
    pub show_target_public: bool,
}

pub struct MonitorService {
    database: Arc<Database>,
    scheduler: Arc<MonitorScheduler>,
    query: Arc<MetricQuery>,
}

impl MonitorService {
    pub fn new(database: Arc<Database>, scheduler: Arc<MonitorScheduler>, query: Arc<MetricQuery>) -> Self {
        Self {
            database,
            scheduler,
            query,
        }
    }

    pub async fn create(&self, input: NewMonitor) -> Result<MonitorTaskRecord> {
        let now = Utc::now();
        let monitor = MonitorTaskRecord {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            monitor_type: input.monitor_type,
            target: input.target,
            config: input.config,
            enabled: true,
            visibility: input.visibility,
            interval_seconds: input.interval_seconds.max(MIN_MONITOR_INTERVAL_SECONDS),
            agent_ids: input.agent_ids,
            tags: input.tags,
            show_target_public: input.show_target_public,
            created_at: now,
            updated_at: now,
        };
        self.database.upsert_monitor(&monitor).await?;
        self.scheduler.add(&monitor.id).await?;
        Ok(monitor)
    }

    pub async fn update(&self, mut monitor: MonitorTaskRecord) -> Result<()> {
        monitor.interval_seconds = monitor.interval_seconds.max(MIN_MONITOR_INTERVAL_SECONDS);
        monitor.updated_at = Utc::now();
        self.database.upsert_monitor(&monitor).await?;
        self.scheduler.update(&monitor.id).await
    }

    /// Deletes the monitor row, cancels its ticker, and drops the TSDB
    /// series it wrote.
    pub async fn delete(&self, monitor_id: &str) -> Result<bool> {
        let deleted = self.database.delete_monitor(monitor_id).await?;
        if deleted {
            self.scheduler.remove(monitor_id).await?;
            if let Err(e) = self.query.delete_monitor_series(monitor_id).await {
                tracing::warn!(monitor_id, error = %e, "failed to delete TSDB series for deleted monitor");
            }
        }
        Ok(deleted)
    }

    pub async fn get(&self, monitor_id: &str) -> Result<Option<MonitorTaskRecord>> {
        self.database.get_monitor_by_id(monitor_id).await
    }

    pub async fn overview(&self, authenticated: bool) -> Result<Vec<MonitorOverviewItem>> {
        self.scheduler.get_overview(authenticated).await
    }
}
