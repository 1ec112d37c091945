//! Monitor task CRUD.

use anyhow::Result;
use sqlx::Row;

use super::records::{MonitorTaskRecord, MonitorType, Visibility};
use super::Database;

const MONITOR_COLUMNS: &str = r#"
    id, name, monitor_type, target, config, enabled, visibility, interval_seconds,
    agent_ids, tags, show_target_public, created_at, updated_at
"#;

fn row_to_monitor(row: &sqlx::sqlite::SqliteRow) -> Result<MonitorTaskRecord> {
    let monitor_type: String = row.try_get("monitor_type")?;
    let config_json: String = row.try_get("config")?;
    let visibility: String = row.try_get("visibility")?;
    let agent_ids_json: String = row.try_get("agent_ids")?;
    let tags_json: String = row.try_get("tags")?;

    Ok(MonitorTaskRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        monitor_type: MonitorType::parse(&monitor_type)
            .ok_or_else(|| anyhow::anyhow!("unknown monitor_type in database: {}", monitor_type))?,
        target: row.try_get("target")?,
        config: serde_json::from_str(&config_json).unwrap_or(serde_json::Value::Null),
        enabled: row.try_get("enabled")?,
        visibility: Visibility::parse(&visibility),
        interval_seconds: row.try_get("interval_seconds")?,
        agent_ids: serde_json::from_str(&agent_ids_json).unwrap_or_default(),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        show_target_public: row.try_get("show_target_public")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Database {
    pub async fn get_all_monitors(&self) -> Result<Vec<MonitorTaskRecord>> {
        let sql = format!("SELECT {} FROM monitor_task ORDER BY name", MONITOR_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_monitor).collect()
    }

    pub async fn get_enabled_monitors(&self) -> Result<Vec<MonitorTaskRecord>> {
        let sql = format!(
            "SELECT {} FROM monitor_task WHERE enabled = 1 ORDER BY name",
            MONITOR_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_monitor).collect()
    }

    pub async fn get_monitor_by_id(&self, id: &str) -> Result<Option<MonitorTaskRecord>> {
        let sql = format!("SELECT {} FROM monitor_task WHERE id = ?", MONITOR_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_monitor).transpose()
    }

    pub async fn upsert_monitor(&self, monitor: &MonitorTaskRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO monitor_task (
                id, name, monitor_type, target, config, enabled, visibility,
                interval_seconds, agent_ids, tags, show_target_public, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                monitor_type = excluded.monitor_type,
                target = excluded.target,
                config = excluded.config,
                enabled = excluded.enabled,
                visibility = excluded.visibility,
                interval_seconds = excluded.interval_seconds,
                agent_ids = excluded.agent_ids,
                tags = excluded.tags,
                show_target_public = excluded.show_target_public,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&monitor.id)
        .bind(&monitor.name)
        .bind(monitor.monitor_type.as_str())
        .bind(&monitor.target)
        .bind(serde_json::to_string(&monitor.config)?)
        .bind(monitor.enabled)
        .bind(monitor.visibility.as_str())
        .bind(monitor.interval_seconds)
        .bind(serde_json::to_string(&monitor.agent_ids)?)
        .bind(serde_json::to_string(&monitor.tags)?)
        .bind(monitor.show_target_public)
        .bind(monitor.created_at)
        .bind(monitor.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_monitor(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM monitor_task WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
