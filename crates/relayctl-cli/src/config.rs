//! Operator-local CLI state
//!
//! Stores the backend endpoint, the persisted session, and the selected
//! tenant in ~/.relayctl/config.json

use anyhow::{Context, Result};
use relayctl_store::Session;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything the CLI remembers between invocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Backend endpoint, scheme + host.
    pub backend_url: Option<String>,
    /// Project API key for requests made before sign-in.
    pub api_key: Option<String>,
    /// Session from the last sign-in, possibly expired.
    pub session: Option<Session>,
    /// Tenant the operator selected with `tenant switch`.
    pub tenant_id: Option<i64>,
}

/// Configuration manager
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(Self {
            path: home.join(".relayctl").join("config.json"),
        })
    }

    /// Create a manager backed by a custom file (for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the configuration from disk, defaulting when the file is absent.
    pub fn load(&self) -> Result<CliConfig> {
        if !self.path.exists() {
            return Ok(CliConfig::default());
        }

        let json = fs::read_to_string(&self.path)
            .context(format!("Failed to read config file: {:?}", self.path))?;

        let config: CliConfig = serde_json::from_str(&json)
            .context(format!("Failed to parse config file: {:?}", self.path))?;

        Ok(config)
    }

    /// Save the configuration to disk.
    pub fn save(&self, config: &CliConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create config directory: {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;

        fs::write(&self.path, json)
            .context(format!("Failed to write config file: {:?}", self.path))?;

        Ok(())
    }

    /// Replace the persisted session.
    pub fn store_session(&self, session: Option<Session>) -> Result<()> {
        let mut config = self.load()?;
        config.session = session;
        self.save(&config)
    }

    /// Replace the selected tenant.
    pub fn store_tenant(&self, tenant_id: Option<i64>) -> Result<()> {
        let mut config = self.load()?;
        config.tenant_id = tenant_id;
        self.save(&config)
    }

    /// Config file location (for display purposes)
    pub fn path(&self) -> &Path {
        &self.path
    }
}
