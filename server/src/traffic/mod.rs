//! Traffic accounter.
//!
//! Tracks each probe's billing-period usage from the cumulative received-byte
//! counter reported on every network sample, re-baselining on counter
//! rollover/restart, and rolling the period over on a configured reset-day
//! with end-of-month clamping. Feeds the alert engine at the 80/90/100%
//! usage thresholds, debounced per period by the `traffic_alert_sent_*` flags
//! on the probe row.

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::alert::AlertEngine;
use crate::database::Database;
use crate::errors::TrafficError;

const THRESHOLDS: [u8; 3] = [80, 90, 100];

pub struct TrafficAccounter {
    database: Arc<Database>,
    alert: Option<Arc<AlertEngine>>,
}

impl TrafficAccounter {
    pub fn new(database: Arc<Database>, alert: Option<Arc<AlertEngine>>) -> Self {
        Self { database, alert }
    }

    /// Per-sample update, driven by metric ingest for every network frame.
    pub async fn on_network_sample(&self, agent_id: &str, cumulative_recv_bytes: i64) -> Result<()> {
        let Some(mut agent) = self.database.get_agent_by_id(agent_id).await? else {
            bail!(TrafficError::AgentNotFound {
                agent_id: agent_id.to_string()
            });
        };

        let Some(limit) = agent.traffic_limit_bytes else {
            return Ok(());
        };
        if limit <= 0 {
            return Ok(());
        }

        let now = Utc::now();

        let used = if agent.traffic_period_start.is_none() {
            agent.traffic_baseline_recv = cumulative_recv_bytes;
            agent.traffic_period_start = Some(now);
            0
        } else {
            let delta = cumulative_recv_bytes - agent.traffic_baseline_recv;
            if delta < 0 {
                agent.traffic_baseline_recv = cumulative_recv_bytes;
                agent.traffic_used_bytes
            } else {
                delta
            }
        };
        agent.traffic_used_bytes = used;

        let pct = ((used as f64) * 100.0 / (limit as f64)) as i64;
        let mut alert_80 = agent.traffic_alert_sent_80;
        let mut alert_90 = agent.traffic_alert_sent_90;
        let mut alert_100 = agent.traffic_alert_sent_100;
        let mut fire_bucket: Option<u8> = None;

        if pct >= 100 && !alert_100 {
            alert_100 = true;
            fire_bucket = Some(100);
        } else if pct >= 90 && !alert_90 {
            alert_90 = true;
            fire_bucket = Some(90);
        } else if pct >= 80 && !alert_80 {
            alert_80 = true;
            fire_bucket = Some(80);
        }

        self.database
            .update_traffic_usage(
                agent_id,
                agent.traffic_used_bytes,
                agent.traffic_baseline_recv,
                agent.traffic_period_start,
                alert_80,
                alert_90,
                alert_100,
                now,
            )
            .await?;

        if let (Some(bucket), Some(alert)) = (fire_bucket, &self.alert) {
            debug_assert!(THRESHOLDS.contains(&bucket));
            alert.check_traffic(agent_id, &agent.name, bucket).await;
        }

        Ok(())
    }

    /// Periodic housekeeping tick, run every minute by the caller.
    pub async fn run_housekeeping(&self) -> Result<()> {
        let now = Utc::now();
        for agent in self.database.get_all_agents().await? {
            if agent.traffic_limit_bytes.is_none() {
                continue;
            }
            let Some(reset_day) = agent.traffic_reset_day else {
                continue;
            };
            let Some(period_start) = agent.traffic_period_start else {
                continue;
            };

            let next_reset = next_reset_date(period_start, reset_day);
            if now >= next_reset {
                if let Err(e) = self.rollover(&agent.id, now).await {
                    warn!(agent_id = %agent.id, error = %e, "traffic rollover failed");
                }
            }
        }
        Ok(())
    }

    async fn rollover(&self, agent_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.database
            .update_traffic_usage(agent_id, 0, 0, Some(now), false, false, false, now)
            .await?;
        debug!(agent_id, "traffic period rolled over");
        Ok(())
    }

    /// Manual "reset now" operation.
    pub async fn reset_traffic(&self, agent_id: &str) -> Result<()> {
        if self.database.get_agent_by_id(agent_id).await?.is_none() {
            bail!(TrafficError::AgentNotFound {
                agent_id: agent_id.to_string()
            });
        }
        self.rollover(agent_id, Utc::now()).await
    }

    /// Updates the traffic policy on a probe. An immediate rollover is
    /// performed when the reset-day changes.
    pub async fn update_traffic_config(&self, agent_id: &str, limit_bytes: Option<i64>, reset_day: i32) -> Result<()> {
        if !(0..=31).contains(&reset_day) {
            bail!(TrafficError::InvalidResetDay { reset_day });
        }
        let Some(mut agent) = self.database.get_agent_by_id(agent_id).await? else {
            bail!(TrafficError::AgentNotFound {
                agent_id: agent_id.to_string()
            });
        };

        let reset_day_changed = agent.traffic_reset_day != Some(reset_day);
        agent.traffic_limit_bytes = limit_bytes;
        agent.traffic_reset_day = Some(reset_day);
        agent.updated_at = Utc::now();
        self.database.upsert_agent(&agent).await?;

        if reset_day_changed {
            self.rollover(agent_id, Utc::now()).await?;
        }
        Ok(())
    }
}

/// Computes the next reset instant: the configured `reset_day` in the month
/// following `period_start`'s month, clamped to that month's last day (e.g.
/// reset-day 31 in February falls back to February's actual last day).
/// `reset_day == 0` is treated as the first day of the month.
fn next_reset_date(period_start: DateTime<Utc>, reset_day: i32) -> DateTime<Utc> {
    let mut year = period_start.year();
    let mut month = period_start.month();
    month += 1;
    if month > 12 {
        month = 1;
        year += 1;
    }

    let days_in_month = days_in_month(year, month);
    let day = (reset_day.max(1) as u32).min(days_in_month);

    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap();
    let first_of_this = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    (first_of_next - first_of_this).num_days() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LatestValueCache;
    use crate::database::{AgentRecord, SshApplyStatus, Visibility};
    use crate::notify::NotificationDispatcher;

    async fn harness() -> (TrafficAccounter, Arc<Database>) {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let database = Arc::new(Database::new(tmp.path().to_str().unwrap()).await.unwrap());
        let cache = Arc::new(LatestValueCache::new());
        let alert = Arc::new(AlertEngine::new(database.clone(), cache, NotificationDispatcher::new(vec![])).await);
        let accounter = TrafficAccounter::new(database.clone(), Some(alert));
        (accounter, database)
    }

    fn blank_agent(id: &str) -> AgentRecord {
        let now = Utc::now();
        AgentRecord {
            id: id.to_string(),
            name: format!("probe-{id}"),
            hostname: "host".to_string(),
            last_ip: None,
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            version: "1.0".to_string(),
            tags: vec![],
            visibility: Visibility::Public,
            weight: 0,
            expire_at: None,
            traffic_limit_bytes: Some(1000),
            traffic_reset_day: Some(1),
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
            online: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn first_sample_establishes_baseline_with_zero_usage() {
        let (accounter, db) = harness().await;
        db.upsert_agent(&blank_agent("a1")).await.unwrap();

        accounter.on_network_sample("a1", 5_000).await.unwrap();

        let agent = db.get_agent_by_id("a1").await.unwrap().unwrap();
        assert_eq!(agent.traffic_baseline_recv, 5_000);
        assert_eq!(agent.traffic_used_bytes, 0);
    }

    #[tokio::test]
    async fn counter_rollover_rebaselines_without_adding_usage() {
        let (accounter, db) = harness().await;
        db.upsert_agent(&blank_agent("a1")).await.unwrap();

        accounter.on_network_sample("a1", 5_000).await.unwrap();
        accounter.on_network_sample("a1", 5_500).await.unwrap();
        // Probe restarted: its cumulative counter reset to a small value.
        accounter.on_network_sample("a1", 200).await.unwrap();

        let agent = db.get_agent_by_id("a1").await.unwrap().unwrap();
        assert_eq!(agent.traffic_baseline_recv, 200);
        // Usage retains the pre-rollover value rather than going negative.
        assert_eq!(agent.traffic_used_bytes, 500);
    }

    #[tokio::test]
    async fn crossing_80_percent_sets_the_debounce_flag_once() {
        let (accounter, db) = harness().await;
        db.upsert_agent(&blank_agent("a1")).await.unwrap();

        accounter.on_network_sample("a1", 0).await.unwrap();
        accounter.on_network_sample("a1", 900).await.unwrap();

        let agent = db.get_agent_by_id("a1").await.unwrap().unwrap();
        assert!(agent.traffic_alert_sent_80);
        assert!(!agent.traffic_alert_sent_90);
    }

    #[tokio::test]
    async fn update_traffic_config_rejects_out_of_range_reset_day() {
        let (accounter, db) = harness().await;
        db.upsert_agent(&blank_agent("a1")).await.unwrap();

        let result = accounter.update_traffic_config("a1", Some(2000), 32).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn end_of_month_reset_day_clamps_to_last_day() {
        let period_start = DateTime::parse_from_rfc3339("2026-01-15T00:00:00Z").unwrap().with_timezone(&Utc);
        let next = next_reset_date(period_start, 31);
        assert_eq!(next.year(), 2026);
        assert_eq!(next.month(), 2);
        assert_eq!(next.day(), 28); // 2026 is not a leap year
    }
}
