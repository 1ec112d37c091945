// File: server/src/config/secrets.rs
//! Secrets loader for seed API tokens.
//!
//! Secrets are stored in a separate TOML file (config/secrets.toml) that
//! should be excluded from version control. On startup the server upserts
//! each seed token into the `api_token` table so that probe registration
//! can validate against the database without needing the secrets file at
//! runtime.
//!
//! Example secrets.toml:
//! ```toml
//! [tokens]
//! default = "replace-me-with-a-real-token"
//! ci-fleet = "another-token-value"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Default)]
pub struct SecretsFile {
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

pub struct SecretsLoader {
    secrets: SecretsFile,
}

impl SecretsLoader {
    /// Load secrets from the specified file path. Returns an empty loader if
    /// the file doesn't exist so a fresh install can still start up.
    pub fn load(secrets_path: &Path) -> Result<Self> {
        if !secrets_path.exists() {
            warn!(
                "Secrets file not found at {:?}, no seed API tokens will be imported",
                secrets_path
            );
            return Ok(Self {
                secrets: SecretsFile::default(),
            });
        }

        let content = std::fs::read_to_string(secrets_path)
            .with_context(|| format!("failed to read secrets file: {:?}", secrets_path))?;

        let secrets: SecretsFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse secrets file: {:?}", secrets_path))?;

        info!(
            "Loaded {} seed API token(s) from {:?}",
            secrets.tokens.len(),
            secrets_path
        );

        Ok(Self { secrets })
    }

    pub fn seed_tokens(&self) -> impl Iterator<Item = (&str, &str)> {
        self.secrets
            .tokens
            .iter()
            .map(|(name, token)| (name.as_str(), token.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_secrets() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[tokens]
default = "token-one"
ci = "token-two"
"#
        )
        .unwrap();

        let loader = SecretsLoader::load(file.path()).unwrap();
        let tokens: HashMap<_, _> = loader.seed_tokens().collect();

        assert_eq!(tokens.get("default"), Some(&"token-one"));
        assert_eq!(tokens.get("ci"), Some(&"token-two"));
    }

    #[test]
    fn test_missing_file() {
        let loader = SecretsLoader::load(Path::new("/nonexistent/path/secrets.toml")).unwrap();
        assert_eq!(loader.seed_tokens().count(), 0);
    }
}
