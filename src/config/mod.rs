//! Configuration management for the relay service.
//!
//! Provides hierarchical configuration loading from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. `config/default.toml` (optional)
//! 3. Explicit config file passed by the caller
//! 4. File named by `CONFIG_PATH`
//! 5. Environment variables `RELAY__<SECTION>__<KEY>` (highest priority)
//!

mod monitoring;
mod rendering;
mod sink;
mod watcher;
pub use monitoring::*;
pub use rendering::*;
pub use sink::*;
pub use watcher::*;


//---
use std::env;
use std::path::PathBuf;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory of the embedded store (watermarks and source records)
    #[serde(default = "default_db_root_dir")]
    pub db_root_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_root_dir: default_db_root_dir(),
        }
    }
}

fn default_db_root_dir() -> PathBuf {
    PathBuf::from("./db")
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Embedded store location
    #[serde(default)]
    pub storage: StorageConfig,
    /// Poll cadence and deduplication parameters
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// Page addressing and extraction selectors
    #[serde(default)]
    pub rendering: RenderingConfig,
    /// Message formatting and sink transport parameters
    #[serde(default)]
    pub sink: SinkConfig,
    /// Reconciliation loop parameters
    #[serde(default)]
    pub manager: ManagerConfig,
    /// Metrics and admin HTTP server
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Operator alert channel
    #[serde(default)]
    pub alert: AlertConfig,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

impl Settings {
    /// Load configuration from multiple sources with priority:
    /// 1. `config/default` (optional)
    /// 2. Caller supplied file
    /// 3. `CONFIG_PATH`
    /// 4. Environment variables
    ///
    /// # Arguments
    /// * `config_path` - Optional path to an explicit configuration file
    ///
    /// # Returns
    /// Merged and validated configuration
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        // 1. Base config
        config = config.add_source(File::with_name("config/default").required(false));

        // 2. Explicit file
        if let Some(path) = config_path {
            config = config.add_source(File::with_name(path).required(true));
        }

        // 3. Environment selected file
        if let Ok(path) = env::var("CONFIG_PATH") {
            config = config.add_source(File::with_name(&path).required(true));
        }

        // 4. Environment variables (highest priority)
        config = config.add_source(
            Environment::with_prefix("RELAY")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates every section
    pub fn validate(&self) -> Result<()> {
        if self.storage.db_root_dir.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "storage.db_root_dir cannot be empty".into(),
            )));
        }
        self.watcher.validate()?;
        self.rendering.validate()?;
        self.sink.validate()?;
        self.manager.validate()?;
        self.monitoring.validate()?;
        self.alert.validate()?;
        Ok(())
    }
}
