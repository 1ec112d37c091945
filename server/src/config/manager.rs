// File: server/src/config/manager.rs
use super::{Config, SecretsLoader};
use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::info;

/// Owns the live configuration and the loaded secrets, behind a lock so a
/// future reload (e.g. rotating notification webhooks) can swap both
/// atomically without restarting the process.
pub struct ConfigManager {
    config: Arc<RwLock<Arc<Config>>>,
    secrets: Arc<SecretsLoader>,
    config_dir: String,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let secrets_path = Path::new(&config_dir).join("secrets.toml");
        let secrets = Arc::new(SecretsLoader::load(&secrets_path)?);

        let config = Self::load_from_toml(&config_dir).await?;
        config
            .validate()
            .map_err(|e| anyhow!("invalid configuration: {}", e))?;

        info!(
            "Configuration loaded: listening on {}:{}, tsdb={}, database={}",
            config.host, config.port, config.tsdb_url, config.database_path
        );

        Ok(Self {
            config: Arc::new(RwLock::new(Arc::new(config))),
            secrets,
            config_dir,
        })
    }

    pub async fn get_current_config(&self) -> Arc<Config> {
        self.config.read().await.clone()
    }

    pub fn secrets(&self) -> &SecretsLoader {
        &self.secrets
    }

    /// Reload configuration from disk (used by integration tests and by the
    /// admin reload endpoint, which is out of scope here but the hook stays
    /// available for callers).
    pub async fn reload(&self) -> Result<()> {
        let config = Self::load_from_toml(&self.config_dir).await?;
        config
            .validate()
            .map_err(|e| anyhow!("invalid configuration: {}", e))?;
        let mut guard = self.config.write().await;
        *guard = Arc::new(config);
        info!("Configuration reloaded from {}", self.config_dir);
        Ok(())
    }

    async fn load_from_toml(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/fleet-server.toml", config_dir);
        let content = fs::read_to_string(&main_config_path)
            .await
            .map_err(|e| anyhow!("failed to read {}: {}", main_config_path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("failed to parse {}: {}", main_config_path, e))?;

        Ok(config)
    }
}
