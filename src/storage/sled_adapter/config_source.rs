use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use tracing::warn;

use crate::constants::SOURCES_TREE;
use crate::ChangeKind;
use crate::ChangeStream;
use crate::ConfigChange;
use crate::ConfigSource;
use crate::Result;
use crate::SourceRecord;
use crate::StorageError;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// How often the blocking watch loop checks whether its consumer is gone
const WATCH_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration records as bincode values in their own sled tree.
///
/// Every write to the tree, through this type or not, shows up on
/// [`ConfigSource::watch_changes`].
#[derive(Clone)]
pub struct SledConfigSource {
    tree: sled::Tree,
}

impl std::fmt::Debug for SledConfigSource {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledConfigSource")
            .field("tree_len", &self.tree.len())
            .finish()
    }
}

impl SledConfigSource {
    pub fn new(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(SOURCES_TREE)?,
        })
    }

    pub fn get_record(
        &self,
        key: &str,
    ) -> Result<Option<SourceRecord>> {
        self.tree
            .get(key)?
            .map(|raw| decode_record(key, &raw))
            .transpose()
    }

    /// Inserts or replaces the record under `record.key`, returning the
    /// previous one
    pub fn put_record(
        &self,
        record: &SourceRecord,
    ) -> Result<Option<SourceRecord>> {
        let value = bincode::serialize(record)?;
        let previous = self.tree.insert(record.key.as_bytes(), value)?;
        self.tree.flush()?;
        previous.map(|raw| decode_record(&record.key, &raw)).transpose()
    }

    pub fn remove_record(
        &self,
        key: &str,
    ) -> Result<Option<SourceRecord>> {
        let previous = self.tree.remove(key)?;
        self.tree.flush()?;
        previous.map(|raw| decode_record(key, &raw)).transpose()
    }
}

#[async_trait]
impl ConfigSource for SledConfigSource {
    async fn list_all(&self) -> Result<Vec<SourceRecord>> {
        let mut records = Vec::with_capacity(self.tree.len());
        for entry in self.tree.iter() {
            let (key, value) = entry?;
            let key = String::from_utf8_lossy(&key).into_owned();
            match decode_record(&key, &value) {
                Ok(record) => records.push(record),
                Err(e) => warn!(%key, "skip unreadable source record: {:?}", e),
            }
        }
        Ok(records)
    }

    async fn watch_changes(&self) -> Result<ChangeStream> {
        let mut subscriber = self.tree.watch_prefix(Vec::<u8>::new());
        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);

        // sled subscribers block; bridge them onto the runtime
        tokio::task::spawn_blocking(move || {
            while !tx.is_closed() {
                let change = match subscriber.next_timeout(WATCH_POLL_TIMEOUT) {
                    Ok(sled::Event::Insert { key, .. }) => ConfigChange {
                        key: String::from_utf8_lossy(&key).into_owned(),
                        kind: ChangeKind::Upsert,
                    },
                    Ok(sled::Event::Remove { key }) => ConfigChange {
                        key: String::from_utf8_lossy(&key).into_owned(),
                        kind: ChangeKind::Remove,
                    },
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        let _ = tx.blocking_send(Err(StorageError::ChangeStreamClosed.into()));
                        break;
                    }
                };
                if tx.blocking_send(Ok(change)).is_err() {
                    break;
                }
            }
            debug!("source change watch stopped");
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

fn decode_record(
    key: &str,
    raw: &[u8],
) -> Result<SourceRecord> {
    bincode::deserialize(raw).map_err(|e| {
        StorageError::DataCorruption {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
