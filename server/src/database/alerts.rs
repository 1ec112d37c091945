//! Alert record and alert-state-machine persistence.

use anyhow::Result;
use sqlx::Row;

use super::records::{AlertLevel, AlertRecordRow, AlertStateRow, AlertStatus};
use super::Database;

const ALERT_RECORD_COLUMNS: &str = r#"
    id, agent_id, agent_name, rule_tag, subject_id, message, threshold, actual_value,
    level, status, fired_at, resolved_at, created_at, updated_at
"#;

fn row_to_alert_record(row: &sqlx::sqlite::SqliteRow) -> Result<AlertRecordRow> {
    let level: String = row.try_get("level")?;
    let status: String = row.try_get("status")?;
    Ok(AlertRecordRow {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        agent_name: row.try_get("agent_name")?,
        rule_tag: row.try_get("rule_tag")?,
        subject_id: row.try_get("subject_id")?,
        message: row.try_get("message")?,
        threshold: row.try_get("threshold")?,
        actual_value: row.try_get("actual_value")?,
        level: AlertLevel::parse(&level),
        status: AlertStatus::parse(&status),
        fired_at: row.try_get("fired_at")?,
        resolved_at: row.try_get("resolved_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_alert_state(row: &sqlx::sqlite::SqliteRow) -> Result<AlertStateRow> {
    Ok(AlertStateRow {
        key: row.try_get("key")?,
        agent_id: row.try_get("agent_id")?,
        rule_tag: row.try_get("rule_tag")?,
        subject_id: row.try_get("subject_id")?,
        threshold: row.try_get("threshold")?,
        duration_seconds: row.try_get("duration_seconds")?,
        last_value: row.try_get("last_value")?,
        last_check_ms: row.try_get("last_check_ms")?,
        start_time_ms: row.try_get("start_time_ms")?,
        is_firing: row.try_get("is_firing")?,
        last_record_id: row.try_get("last_record_id")?,
    })
}

impl Database {
    // ------------------------------------------------------------------
    // alert_record
    // ------------------------------------------------------------------

    pub async fn insert_alert_record(&self, record: &AlertRecordRow) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO alert_record (
                agent_id, agent_name, rule_tag, subject_id, message, threshold,
                actual_value, level, status, fired_at, resolved_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.agent_id)
        .bind(&record.agent_name)
        .bind(&record.rule_tag)
        .bind(&record.subject_id)
        .bind(&record.message)
        .bind(record.threshold)
        .bind(record.actual_value)
        .bind(record.level.as_str())
        .bind(record.status.as_str())
        .bind(record.fired_at)
        .bind(record.resolved_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn resolve_alert_record(&self, id: i64, resolved_at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE alert_record SET status = 'resolved', resolved_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(resolved_at)
        .bind(resolved_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_alert_records_for_agent(
        &self,
        agent_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AlertRecordRow>> {
        let sql = format!(
            "SELECT {} FROM alert_record WHERE agent_id = ? ORDER BY fired_at DESC LIMIT ? OFFSET ?",
            ALERT_RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(agent_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_alert_record).collect()
    }

    pub async fn get_all_alert_records(&self, limit: i64, offset: i64) -> Result<Vec<AlertRecordRow>> {
        let sql = format!(
            "SELECT {} FROM alert_record ORDER BY fired_at DESC LIMIT ? OFFSET ?",
            ALERT_RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_alert_record).collect()
    }

    pub async fn count_alert_records(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alert_record")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Deletes every alert record and alert state row. Used by the dashboard
    /// "clear all alerts" action.
    pub async fn clear_all_alerts(&self) -> Result<()> {
        sqlx::query("DELETE FROM alert_record").execute(&self.pool).await?;
        sqlx::query("DELETE FROM alert_state").execute(&self.pool).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // alert_state
    // ------------------------------------------------------------------

    pub async fn get_alert_state(&self, key: &str) -> Result<Option<AlertStateRow>> {
        let row = sqlx::query(
            "SELECT key, agent_id, rule_tag, subject_id, threshold, duration_seconds, \
             last_value, last_check_ms, start_time_ms, is_firing, last_record_id \
             FROM alert_state WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_alert_state).transpose()
    }

    pub async fn get_all_alert_states(&self) -> Result<Vec<AlertStateRow>> {
        let rows = sqlx::query(
            "SELECT key, agent_id, rule_tag, subject_id, threshold, duration_seconds, \
             last_value, last_check_ms, start_time_ms, is_firing, last_record_id \
             FROM alert_state",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_alert_state).collect()
    }

    pub async fn upsert_alert_state(&self, state: &AlertStateRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_state (
                key, agent_id, rule_tag, subject_id, threshold, duration_seconds,
                last_value, last_check_ms, start_time_ms, is_firing, last_record_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                threshold = excluded.threshold,
                duration_seconds = excluded.duration_seconds,
                last_value = excluded.last_value,
                last_check_ms = excluded.last_check_ms,
                start_time_ms = excluded.start_time_ms,
                is_firing = excluded.is_firing,
                last_record_id = excluded.last_record_id
            "#,
        )
        .bind(&state.key)
        .bind(&state.agent_id)
        .bind(&state.rule_tag)
        .bind(&state.subject_id)
        .bind(state.threshold)
        .bind(state.duration_seconds)
        .bind(state.last_value)
        .bind(state.last_check_ms)
        .bind(state.start_time_ms)
        .bind(state.is_firing)
        .bind(state.last_record_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_alert_state(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM alert_state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_alert_states_for_agent(&self, agent_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM alert_state WHERE agent_id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Probe-delete cascade.
    pub async fn delete_alert_records_for_agent(&self, agent_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM alert_record WHERE agent_id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        self.delete_alert_states_for_agent(agent_id).await
    }
}
