//! Tamper-protect event/alert log.

use anyhow::Result;
use sqlx::Row;

use super::records::{TamperAlertRecord, TamperEventRecord};
use super::Database;

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<TamperEventRecord> {
    Ok(TamperEventRecord {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        path: row.try_get("path")?,
        operation: row.try_get("operation")?,
        details: row.try_get("details")?,
        restored: row.try_get("restored")?,
        event_time: row.try_get("event_time")?,
    })
}

fn row_to_alert(row: &sqlx::sqlite::SqliteRow) -> Result<TamperAlertRecord> {
    Ok(TamperAlertRecord {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        path: row.try_get("path")?,
        operation: row.try_get("operation")?,
        details: row.try_get("details")?,
        restored: row.try_get("restored")?,
        event_time: row.try_get("event_time")?,
    })
}

impl Database {
    pub async fn insert_tamper_event(&self, record: &TamperEventRecord) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO tamper_event (agent_id, path, operation, details, restored, event_time) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.agent_id)
        .bind(&record.path)
        .bind(&record.operation)
        .bind(&record.details)
        .bind(record.restored)
        .bind(record.event_time)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_tamper_events_for_agent(
        &self,
        agent_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TamperEventRecord>> {
        let rows = sqlx::query(
            "SELECT id, agent_id, path, operation, details, restored, event_time \
             FROM tamper_event WHERE agent_id = ? ORDER BY event_time DESC LIMIT ? OFFSET ?",
        )
        .bind(agent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_event).collect()
    }

    pub async fn insert_tamper_alert(&self, record: &TamperAlertRecord) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO tamper_alert (agent_id, path, operation, details, restored, event_time) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.agent_id)
        .bind(&record.path)
        .bind(&record.operation)
        .bind(&record.details)
        .bind(record.restored)
        .bind(record.event_time)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_tamper_alerts_for_agent(
        &self,
        agent_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TamperAlertRecord>> {
        let rows = sqlx::query(
            "SELECT id, agent_id, path, operation, details, restored, event_time \
             FROM tamper_alert WHERE agent_id = ? ORDER BY event_time DESC LIMIT ? OFFSET ?",
        )
        .bind(agent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_alert).collect()
    }

    /// Probe-delete cascade.
    pub async fn delete_tamper_records_for_agent(&self, agent_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM tamper_event WHERE agent_id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM tamper_alert WHERE agent_id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
