//! API token CRUD: used for probe registration and dashboard authentication.

use anyhow::Result;
use sqlx::Row;

use super::records::ApiTokenRecord;
use super::Database;

impl Database {
    pub async fn get_all_tokens(&self) -> Result<Vec<ApiTokenRecord>> {
        let rows = sqlx::query("SELECT token, name, enabled, created_at FROM api_token ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        let mut tokens = Vec::new();
        for row in rows {
            tokens.push(ApiTokenRecord {
                token: row.try_get("token")?,
                name: row.try_get("name")?,
                enabled: row.try_get("enabled")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(tokens)
    }

    pub async fn get_token(&self, token: &str) -> Result<Option<ApiTokenRecord>> {
        let row = sqlx::query("SELECT token, name, enabled, created_at FROM api_token WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            Ok(Some(ApiTokenRecord {
                token: row.try_get("token")?,
                name: row.try_get("name")?,
                enabled: row.try_get("enabled")?,
                created_at: row.try_get("created_at")?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Used at startup to import seed tokens from `secrets.toml` without
    /// clobbering a token an operator already disabled via the dashboard.
    pub async fn upsert_token_if_absent(&self, record: &ApiTokenRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO api_token (token, name, enabled, created_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(token) DO NOTHING",
        )
        .bind(&record.token)
        .bind(&record.name)
        .bind(record.enabled)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_token(&self, record: &ApiTokenRecord) -> Result<()> {
        sqlx::query("INSERT INTO api_token (token, name, enabled, created_at) VALUES (?, ?, ?, ?)")
            .bind(&record.token)
            .bind(&record.name)
            .bind(record.enabled)
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_token_enabled(&self, token: &str, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE api_token SET enabled = ? WHERE token = ?")
            .bind(enabled)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_token(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_token WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
