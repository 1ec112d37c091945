//! Probe (agent) CRUD and policy updates.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::records::{AgentRecord, SshApplyStatus, Visibility};
use super::Database;

fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> Result<AgentRecord> {
    let tags_json: String = row.try_get("tags")?;
    let allowlist_json: String = row.try_get("ssh_login_allowlist")?;
    let tamper_paths_json: String = row.try_get("tamper_paths")?;
    let visibility: String = row.try_get("visibility")?;
    let ssh_status: String = row.try_get("ssh_login_apply_status")?;

    Ok(AgentRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        hostname: row.try_get("hostname")?,
        last_ip: row.try_get("last_ip")?,
        os: row.try_get("os")?,
        arch: row.try_get("arch")?,
        version: row.try_get("version")?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        visibility: Visibility::parse(&visibility),
        weight: row.try_get("weight")?,
        expire_at: row.try_get("expire_at")?,
        traffic_limit_bytes: row.try_get("traffic_limit_bytes")?,
        traffic_reset_day: row.try_get("traffic_reset_day")?,
        traffic_used_bytes: row.try_get("traffic_used_bytes")?,
        traffic_period_start: row.try_get("traffic_period_start")?,
        traffic_baseline_recv: row.try_get("traffic_baseline_recv")?,
        traffic_alert_sent_80: row.try_get("traffic_alert_sent_80")?,
        traffic_alert_sent_90: row.try_get("traffic_alert_sent_90")?,
        traffic_alert_sent_100: row.try_get("traffic_alert_sent_100")?,
        ssh_login_enabled: row.try_get("ssh_login_enabled")?,
        ssh_login_allowlist: serde_json::from_str(&allowlist_json).unwrap_or_default(),
        ssh_login_apply_status: SshApplyStatus::parse(&ssh_status),
        ssh_login_apply_message: row.try_get("ssh_login_apply_message")?,
        tamper_enabled: row.try_get("tamper_enabled")?,
        tamper_paths: serde_json::from_str(&tamper_paths_json).unwrap_or_default(),
        last_seen_at: row.try_get("last_seen_at")?,
        online: row.try_get("online")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const AGENT_COLUMNS: &str = r#"
    id, name, hostname, last_ip, os, arch, version, tags, visibility, weight, expire_at,
    traffic_limit_bytes, traffic_reset_day, traffic_used_bytes, traffic_period_start,
    traffic_baseline_recv, traffic_alert_sent_80, traffic_alert_sent_90, traffic_alert_sent_100,
    ssh_login_enabled, ssh_login_allowlist, ssh_login_apply_status, ssh_login_apply_message,
    tamper_enabled, tamper_paths, last_seen_at, online, created_at, updated_at
"#;

impl Database {
    pub async fn get_all_agents(&self) -> Result<Vec<AgentRecord>> {
        let sql = format!("SELECT {} FROM agent ORDER BY name", AGENT_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_agent).collect()
    }

    pub async fn get_agent_by_id(&self, id: &str) -> Result<Option<AgentRecord>> {
        let sql = format!("SELECT {} FROM agent WHERE id = ?", AGENT_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    pub async fn upsert_agent(&self, agent: &AgentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent (
                id, name, hostname, last_ip, os, arch, version, tags, visibility, weight,
                expire_at, traffic_limit_bytes, traffic_reset_day, traffic_used_bytes,
                traffic_period_start, traffic_baseline_recv, traffic_alert_sent_80,
                traffic_alert_sent_90, traffic_alert_sent_100, ssh_login_enabled,
                ssh_login_allowlist, ssh_login_apply_status, ssh_login_apply_message,
                tamper_enabled, tamper_paths, last_seen_at, online, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                hostname = excluded.hostname,
                last_ip = excluded.last_ip,
                os = excluded.os,
                arch = excluded.arch,
                version = excluded.version,
                tags = excluded.tags,
                visibility = excluded.visibility,
                weight = excluded.weight,
                expire_at = excluded.expire_at,
                traffic_limit_bytes = excluded.traffic_limit_bytes,
                traffic_reset_day = excluded.traffic_reset_day,
                traffic_used_bytes = excluded.traffic_used_bytes,
                traffic_period_start = excluded.traffic_period_start,
                traffic_baseline_recv = excluded.traffic_baseline_recv,
                traffic_alert_sent_80 = excluded.traffic_alert_sent_80,
                traffic_alert_sent_90 = excluded.traffic_alert_sent_90,
                traffic_alert_sent_100 = excluded.traffic_alert_sent_100,
                ssh_login_enabled = excluded.ssh_login_enabled,
                ssh_login_allowlist = excluded.ssh_login_allowlist,
                ssh_login_apply_status = excluded.ssh_login_apply_status,
                ssh_login_apply_message = excluded.ssh_login_apply_message,
                tamper_enabled = excluded.tamper_enabled,
                tamper_paths = excluded.tamper_paths,
                last_seen_at = excluded.last_seen_at,
                online = excluded.online,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&agent.hostname)
        .bind(&agent.last_ip)
        .bind(&agent.os)
        .bind(&agent.arch)
        .bind(&agent.version)
        .bind(serde_json::to_string(&agent.tags)?)
        .bind(agent.visibility.as_str())
        .bind(agent.weight)
        .bind(agent.expire_at)
        .bind(agent.traffic_limit_bytes)
        .bind(agent.traffic_reset_day)
        .bind(agent.traffic_used_bytes)
        .bind(agent.traffic_period_start)
        .bind(agent.traffic_baseline_recv)
        .bind(agent.traffic_alert_sent_80)
        .bind(agent.traffic_alert_sent_90)
        .bind(agent.traffic_alert_sent_100)
        .bind(agent.ssh_login_enabled)
        .bind(serde_json::to_string(&agent.ssh_login_allowlist)?)
        .bind(agent.ssh_login_apply_status.as_str())
        .bind(&agent.ssh_login_apply_message)
        .bind(agent.tamper_enabled)
        .bind(serde_json::to_string(&agent.tamper_paths)?)
        .bind(agent.last_seen_at)
        .bind(agent.online)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_agent(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM agent WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Marks a probe online/offline and stamps `last_seen_at` / `last_ip`.
    /// Used on connect, disconnect, and heartbeat-grace expiry.
    pub async fn set_agent_online(
        &self,
        id: &str,
        online: bool,
        last_ip: Option<&str>,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE agent SET online = ?, last_ip = COALESCE(?, last_ip), last_seen_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(online)
        .bind(last_ip)
        .bind(seen_at)
        .bind(seen_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_traffic_usage(
        &self,
        id: &str,
        used_bytes: i64,
        baseline_recv: i64,
        period_start: Option<DateTime<Utc>>,
        alert_80: bool,
        alert_90: bool,
        alert_100: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE agent SET
                traffic_used_bytes = ?,
                traffic_baseline_recv = ?,
                traffic_period_start = ?,
                traffic_alert_sent_80 = ?,
                traffic_alert_sent_90 = ?,
                traffic_alert_sent_100 = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(used_bytes)
        .bind(baseline_recv)
        .bind(period_start)
        .bind(alert_80)
        .bind(alert_90)
        .bind(alert_100)
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
