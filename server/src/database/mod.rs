//! Relational store: sqlite via sqlx.
//!
//! SQLite persistence for everything that is not a metric sample: probe
//! identity/policy, API tokens, monitor task definitions, alert records and
//! alert-state-machine rows, SSH-login events, tamper-protect events/alerts,
//! and a small property key/value table for loosely-structured config.
//!
//! Submodules:
//! - `records` - entity types
//! - `agents` - probe CRUD + traffic/ssh/tamper policy updates
//! - `tokens` - API token CRUD
//! - `monitors` - monitor task CRUD
//! - `alerts` - alert record + alert state CRUD
//! - `ssh` - SSH-login event log
//! - `tamper` - tamper event/alert log
//! - `property` - generic KV store

mod agents;
mod alerts;
mod monitors;
mod property;
mod records;
mod ssh;
mod tamper;
mod tokens;

pub use records::*;

use anyhow::Result;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{error, info};

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Expose pool for integration test queries
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        info!("=== Starting database initialization ===");
        info!("Database path: {}", database_path);

        if let Some(parent) = Path::new(database_path).parent() {
            info!("Ensuring parent directory exists: {:?}", parent);
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!("FAILED to create parent directory {:?}: {}", parent, e);
                return Err(e.into());
            }
            info!("Parent directory OK");
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        info!("Connecting to database with URL: {}", database_url);

        let pool = match SqlitePool::connect(&database_url).await {
            Ok(pool) => {
                info!("Successfully connected to SQLite database");
                pool
            }
            Err(e) => {
                error!("FAILED to connect to database: {}", e);
                error!("   Database path: {}", database_path);
                return Err(e.into());
            }
        };

        let database = Self { pool };

        info!("Starting table initialization...");
        match database.initialize_tables().await {
            Ok(_) => info!("Database tables initialized successfully"),
            Err(e) => {
                error!("CRITICAL: Database table initialization failed: {}", e);
                return Err(e);
            }
        }

        info!("Testing database connectivity...");
        match database.test_database().await {
            Ok(_) => info!("Database test successful"),
            Err(e) => {
                error!("Database test failed: {}", e);
                return Err(e);
            }
        }

        info!("=== Database initialization completed successfully ===");
        Ok(database)
    }

    async fn initialize_tables(&self) -> Result<()> {
        info!("Step 1: Creating agent table...");
        let agent_sql = r#"
            CREATE TABLE IF NOT EXISTS agent (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                hostname TEXT NOT NULL,
                last_ip TEXT,
                os TEXT NOT NULL,
                arch TEXT NOT NULL,
                version TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                visibility TEXT NOT NULL DEFAULT 'public',
                weight INTEGER NOT NULL DEFAULT 0,
                expire_at DATETIME,
                traffic_limit_bytes INTEGER,
                traffic_reset_day INTEGER,
                traffic_used_bytes INTEGER NOT NULL DEFAULT 0,
                traffic_period_start DATETIME,
                traffic_baseline_recv INTEGER NOT NULL DEFAULT 0,
                traffic_alert_sent_80 BOOLEAN NOT NULL DEFAULT 0,
                traffic_alert_sent_90 BOOLEAN NOT NULL DEFAULT 0,
                traffic_alert_sent_100 BOOLEAN NOT NULL DEFAULT 0,
                ssh_login_enabled BOOLEAN NOT NULL DEFAULT 0,
                ssh_login_allowlist TEXT NOT NULL DEFAULT '[]',
                ssh_login_apply_status TEXT NOT NULL DEFAULT 'pending',
                ssh_login_apply_message TEXT,
                tamper_enabled BOOLEAN NOT NULL DEFAULT 0,
                tamper_paths TEXT NOT NULL DEFAULT '[]',
                last_seen_at DATETIME,
                online BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(agent_sql).execute(&self.pool).await {
            error!("FAILED to create agent table: {}", e);
            return Err(e.into());
        }
        info!("agent table created");

        info!("Step 2: Creating api_token table...");
        let token_sql = r#"
            CREATE TABLE IF NOT EXISTS api_token (
                token TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(token_sql).execute(&self.pool).await {
            error!("FAILED to create api_token table: {}", e);
            return Err(e.into());
        }
        info!("api_token table created");

        info!("Step 3: Creating monitor_task table...");
        let monitor_sql = r#"
            CREATE TABLE IF NOT EXISTS monitor_task (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                monitor_type TEXT NOT NULL,
                target TEXT NOT NULL,
                config TEXT NOT NULL DEFAULT '{}',
                enabled BOOLEAN NOT NULL DEFAULT 1,
                visibility TEXT NOT NULL DEFAULT 'public',
                interval_seconds INTEGER NOT NULL,
                agent_ids TEXT NOT NULL DEFAULT '[]',
                tags TEXT NOT NULL DEFAULT '[]',
                show_target_public BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(monitor_sql).execute(&self.pool).await {
            error!("FAILED to create monitor_task table: {}", e);
            return Err(e.into());
        }
        info!("monitor_task table created");

        info!("Step 4: Creating alert_record table...");
        let alert_record_sql = r#"
            CREATE TABLE IF NOT EXISTS alert_record (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL,
                agent_name TEXT NOT NULL,
                rule_tag TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                message TEXT NOT NULL,
                threshold REAL NOT NULL,
                actual_value REAL NOT NULL,
                level TEXT NOT NULL,
                status TEXT NOT NULL,
                fired_at DATETIME NOT NULL,
                resolved_at DATETIME,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(alert_record_sql).execute(&self.pool).await {
            error!("FAILED to create alert_record table: {}", e);
            return Err(e.into());
        }
        info!("alert_record table created");

        let alert_record_index_sql = "CREATE INDEX IF NOT EXISTS idx_alert_record_agent ON alert_record(agent_id, fired_at DESC)";
        if let Err(e) = sqlx::query(alert_record_index_sql)
            .execute(&self.pool)
            .await
        {
            error!("FAILED to create alert_record index: {}", e);
            return Err(e.into());
        }

        info!("Step 5: Creating alert_state table...");
        let alert_state_sql = r#"
            CREATE TABLE IF NOT EXISTS alert_state (
                key TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                rule_tag TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                threshold REAL NOT NULL,
                duration_seconds INTEGER NOT NULL,
                last_value REAL NOT NULL,
                last_check_ms INTEGER NOT NULL,
                start_time_ms INTEGER NOT NULL,
                is_firing BOOLEAN NOT NULL,
                last_record_id INTEGER NOT NULL DEFAULT 0
            )
        "#;
        if let Err(e) = sqlx::query(alert_state_sql).execute(&self.pool).await {
            error!("FAILED to create alert_state table: {}", e);
            return Err(e.into());
        }
        info!("alert_state table created");

        info!("Step 6: Creating ssh_login_event table...");
        let ssh_sql = r#"
            CREATE TABLE IF NOT EXISTS ssh_login_event (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL,
                username TEXT NOT NULL,
                source_ip TEXT NOT NULL,
                source_port INTEGER NOT NULL,
                status TEXT NOT NULL,
                tty TEXT,
                session_id TEXT,
                event_time DATETIME NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(ssh_sql).execute(&self.pool).await {
            error!("FAILED to create ssh_login_event table: {}", e);
            return Err(e.into());
        }
        info!("ssh_login_event table created");

        let ssh_index_sql = "CREATE INDEX IF NOT EXISTS idx_ssh_login_agent ON ssh_login_event(agent_id, event_time DESC)";
        if let Err(e) = sqlx::query(ssh_index_sql).execute(&self.pool).await {
            error!("FAILED to create ssh_login_event index: {}", e);
            return Err(e.into());
        }

        info!("Step 7: Creating tamper_event table...");
        let tamper_event_sql = r#"
            CREATE TABLE IF NOT EXISTS tamper_event (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL,
                path TEXT NOT NULL,
                operation TEXT NOT NULL,
                details TEXT,
                restored BOOLEAN NOT NULL DEFAULT 0,
                event_time DATETIME NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(tamper_event_sql).execute(&self.pool).await {
            error!("FAILED to create tamper_event table: {}", e);
            return Err(e.into());
        }
        info!("tamper_event table created");

        info!("Step 8: Creating tamper_alert table...");
        let tamper_alert_sql = r#"
            CREATE TABLE IF NOT EXISTS tamper_alert (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL,
                path TEXT NOT NULL,
                operation TEXT NOT NULL,
                details TEXT,
                restored BOOLEAN NOT NULL DEFAULT 0,
                event_time DATETIME NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(tamper_alert_sql).execute(&self.pool).await {
            error!("FAILED to create tamper_alert table: {}", e);
            return Err(e.into());
        }
        info!("tamper_alert table created");

        info!("Step 9: Creating property table...");
        let property_sql = r#"
            CREATE TABLE IF NOT EXISTS property (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(property_sql).execute(&self.pool).await {
            error!("FAILED to create property table: {}", e);
            return Err(e.into());
        }
        info!("property table created");

        Ok(())
    }

    async fn test_database(&self) -> Result<()> {
        info!("Testing table existence...");
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name IN \
             ('agent', 'api_token', 'monitor_task', 'alert_record', 'alert_state', \
              'ssh_login_event', 'tamper_event', 'tamper_alert', 'property')",
        )
        .fetch_all(&self.pool)
        .await?;

        if tables.len() != 9 {
            error!("Expected 9 tables, found {}: {:?}", tables.len(), tables);
            return Err(anyhow::anyhow!("Database tables not properly created"));
        }
        info!("All required tables exist: {:?}", tables);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_initializes_all_tables() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();
        drop(tmp);

        let db = Database::new(&path).await.unwrap();
        db.test_database().await.unwrap();
    }
}
