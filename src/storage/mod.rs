//! Durable state: per-source watermarks and the configuration records that
//! decide which sources are watched.

mod sled_adapter;

#[doc(hidden)]
pub use sled_adapter::*;

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::constants::STORE_DIR;
use crate::ItemId;
use crate::Result;
use crate::SinkTarget;

/// Durable mapping source id → last delivered item id
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WatermarkStore: Send + Sync + 'static {
    async fn get(
        &self,
        source_id: &str,
    ) -> Result<Option<ItemId>>;

    /// Durable once this returns
    async fn upsert(
        &self,
        source_id: &str,
        id: ItemId,
    ) -> Result<()>;
}

/// One externally edited configuration record.
///
/// A record fans a group of accounts out to one sink; several records may
/// name the same account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub key: String,
    pub enabled: bool,
    pub accounts: BTreeSet<String>,
    pub sink_target: SinkTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Upsert,
    Remove,
}

/// Payload is informational; consumers recompute from [`ConfigSource::list_all`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    pub key: String,
    pub kind: ChangeKind,
}

/// Ends only when the source is gone for good
pub type ChangeStream = BoxStream<'static, Result<ConfigChange>>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigSource: Send + Sync + 'static {
    /// Every record, ordered by key
    async fn list_all(&self) -> Result<Vec<SourceRecord>>;

    /// Infinite stream of change notifications
    async fn watch_changes(&self) -> Result<ChangeStream>;
}

/// Opens the relay database under `db_root_dir`
pub fn init_sled_db(
    db_root_dir: impl AsRef<Path> + std::fmt::Debug
) -> std::result::Result<sled::Db, std::io::Error> {
    debug!("init_sled_db from path: {:?}", &db_root_dir);

    let db_path = db_root_dir.as_ref().join(STORE_DIR);

    sled::Config::default()
        .path(&db_path)
        .cache_capacity(10 * 1024 * 1024) //10MB
        .flush_every_ms(Some(100))
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", db_path, e);
            std::io::Error::other(e)
        })
}
