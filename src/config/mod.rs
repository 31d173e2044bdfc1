//! Configuration management for Drydock

pub mod schema;

pub use schema::Config;

use crate::error::{DrydockError, DrydockResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// File name of the project-local configuration
pub const LOCAL_CONFIG_NAME: &str = "drydock.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
    state_dir: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default paths
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            state_dir: Self::default_state_dir(),
        }
    }

    /// Create a config manager with a custom config path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: path,
            state_dir: Self::default_state_dir(),
        }
    }

    /// Override where ledger, run logs and the journal are kept
    pub fn with_state_dir(mut self, dir: PathBuf) -> Self {
        self.state_dir = dir;
        self
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("drydock")
            .join("config.toml")
    }

    /// Get the default state directory path
    pub fn default_state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("drydock")
    }

    /// Get the state directory path
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Ledger directory, honouring `[ledger] dir`
    pub fn ledger_dir(&self, config: &Config) -> PathBuf {
        config
            .ledger
            .dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join("ledger"))
    }

    /// Directory holding per-run output logs
    pub fn runs_dir(&self) -> PathBuf {
        self.state_dir.join("runs")
    }

    /// Get the journal path
    pub fn journal_path(&self) -> PathBuf {
        self.state_dir.join("journal.log")
    }

    /// Walk up from `start` looking for a project-local config
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, creating default if not exists
    pub async fn load(&self) -> DrydockResult<Config> {
        self.load_merged(None).await
    }

    /// Load the global config and merge a project-local config over it
    ///
    /// Tables merge key by key; arrays and scalars from the local file
    /// replace the global ones.
    pub async fn load_merged(&self, local: Option<&Path>) -> DrydockResult<Config> {
        let mut merged = toml::Table::new();

        if self.config_path.exists() {
            merged = Self::read_table(&self.config_path).await?;
        } else {
            debug!("Config file not found, using defaults");
        }

        if let Some(local) = local {
            let overlay = Self::read_table(local).await?;
            merge_tables(&mut merged, overlay);
        }

        let source = local.unwrap_or(&self.config_path).to_path_buf();
        let config: Config =
            toml::Value::Table(merged)
                .try_into()
                .map_err(|e: toml::de::Error| DrydockError::ConfigInvalid {
                    path: source.clone(),
                    reason: e.to_string(),
                })?;

        config.validate().map_err(|e| DrydockError::ConfigInvalid {
            path: source,
            reason: e.to_string(),
        })?;

        Ok(config)
    }

    async fn read_table(path: &Path) -> DrydockResult<toml::Table> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| DrydockError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| DrydockError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> DrydockResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            DrydockError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> DrydockResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DrydockError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure all state directories exist
    pub async fn ensure_state_dirs(&self, config: &Config) -> DrydockResult<()> {
        let dirs = [
            self.state_dir.clone(),
            self.ledger_dir(config),
            self.runs_dir(),
        ];

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                DrydockError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
