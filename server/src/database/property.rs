//! Generic key/value property store.
//!
//! Holds loosely-structured configuration that doesn't warrant its own
//! table: alert-rule overrides, notification channel settings, public-IP
//! lookup config. An open key space rather than a fixed settings struct, so
//! new configuration kinds don't need a migration.

use anyhow::Result;
use chrono::Utc;
use sqlx::Row;

use super::records::PropertyRecord;
use super::Database;

impl Database {
    pub async fn get_property(&self, key: &str) -> Result<Option<PropertyRecord>> {
        let row = sqlx::query("SELECT key, value, updated_at FROM property WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            Ok(Some(PropertyRecord {
                key: row.try_get("key")?,
                value: row.try_get("value")?,
                updated_at: row.try_get("updated_at")?,
            }))
        } else {
            Ok(None)
        }
    }

    pub async fn set_property(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO property (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_property(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM property WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
