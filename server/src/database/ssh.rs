//! SSH-login event log.

use anyhow::Result;
use sqlx::Row;

use super::records::{SshLoginEventRecord, SshLoginStatus};
use super::Database;

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<SshLoginEventRecord> {
    let status: String = row.try_get("status")?;
    Ok(SshLoginEventRecord {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        username: row.try_get("username")?,
        source_ip: row.try_get("source_ip")?,
        source_port: row.try_get("source_port")?,
        status: SshLoginStatus::parse(&status),
        tty: row.try_get("tty")?,
        session_id: row.try_get("session_id")?,
        event_time: row.try_get("event_time")?,
    })
}

impl Database {
    pub async fn insert_ssh_login_event(&self, record: &SshLoginEventRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO ssh_login_event (agent_id, username, source_ip, source_port, status, tty, session_id, event_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.agent_id)
        .bind(&record.username)
        .bind(&record.source_ip)
        .bind(record.source_port)
        .bind(record.status.as_str())
        .bind(&record.tty)
        .bind(&record.session_id)
        .bind(record.event_time)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_ssh_login_events_for_agent(
        &self,
        agent_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SshLoginEventRecord>> {
        let rows = sqlx::query(
            "SELECT id, agent_id, username, source_ip, source_port, status, tty, session_id, event_time \
             FROM ssh_login_event WHERE agent_id = ? ORDER BY event_time DESC LIMIT ? OFFSET ?",
        )
        .bind(agent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_event).collect()
    }

    /// Dashboard "delete by agent" action, also used by the probe-delete
    /// cascade.
    pub async fn delete_ssh_login_events_for_agent(&self, agent_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM ssh_login_event WHERE agent_id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
