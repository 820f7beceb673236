use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::GENESIS_ITEM_ID;
use crate::Error;
use crate::ItemId;
use crate::Result;

/// Per-source poll cadence and deduplication parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatcherConfig {
    /// Period between two poll cycles of the same watcher
    #[serde(default = "default_poll_interval")]
    pub poll_interval_in_secs: u64,

    /// Number of recently delivered ids remembered per watcher
    #[serde(default = "default_recent_ids_capacity")]
    pub recent_ids_capacity: usize,

    /// Watermark used when the store has no record for a source
    #[serde(default = "default_genesis_item_id")]
    pub genesis_item_id: u64,

    /// Absorbs rounding when comparing decoded timestamps
    #[serde(default = "default_timestamp_tolerance")]
    pub timestamp_tolerance_in_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_in_secs: default_poll_interval(),
            recent_ids_capacity: default_recent_ids_capacity(),
            genesis_item_id: default_genesis_item_id(),
            timestamp_tolerance_in_ms: default_timestamp_tolerance(),
        }
    }
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_in_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watcher.poll_interval_in_secs must be greater than 0".into(),
            )));
        }
        if self.recent_ids_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watcher.recent_ids_capacity must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_in_secs)
    }

    pub fn genesis(&self) -> ItemId {
        ItemId::new(self.genesis_item_id)
    }
}

fn default_poll_interval() -> u64 {
    120
}
fn default_recent_ids_capacity() -> usize {
    10
}
fn default_genesis_item_id() -> u64 {
    GENESIS_ITEM_ID
}
fn default_timestamp_tolerance() -> u64 {
    1
}

/// Reconciliation loop parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ManagerConfig {
    /// Period of the resync pass that runs without a change notification.
    /// 0 disables it.
    #[serde(default = "default_resync_interval")]
    pub resync_interval_in_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            resync_interval_in_secs: default_resync_interval(),
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_in_secs > 0).then(|| Duration::from_secs(self.resync_interval_in_secs))
    }
}

fn default_resync_interval() -> u64 {
    600
}
