use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::Result;
use crate::SourceConfig;
use crate::WatcherContext;
use crate::WatcherError;
use crate::WatcherHandle;
use crate::WatcherStatus;
use crate::REGISTERED_WATCHERS;

/// Live watchers keyed by source id.
///
/// Only the manager mutates it; status readers (admin surface, tests) may
/// read concurrently.
#[derive(Clone, Default)]
pub struct WatcherRegistry {
    watchers: Arc<DashMap<String, Arc<WatcherHandle>>>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates, starts and registers a watcher for `config`.
    ///
    /// The slot is claimed before the watcher is started, so a duplicate can
    /// never be created for the same source.
    pub fn create(
        &self,
        config: SourceConfig,
        ctx: &WatcherContext,
    ) -> Result<Arc<WatcherHandle>> {
        WatcherHandle::validate(&config, &ctx.settings)?;

        let handle = match self.watchers.entry(config.source_id.clone()) {
            Entry::Occupied(_) => {
                return Err(WatcherError::AlreadyExists {
                    source_id: config.source_id,
                }
                .into());
            }
            Entry::Vacant(slot) => {
                let handle = WatcherHandle::start(config, ctx.clone())?;
                slot.insert(handle.clone());
                handle
            }
        };

        debug!(source_id = %handle.source_id(), "watcher registered");
        REGISTERED_WATCHERS.set(self.watchers.len() as i64);
        Ok(handle)
    }

    /// Unregisters `source_id`. Only one caller ever receives a given
    /// handle, which makes it the one responsible for its teardown.
    pub fn remove(
        &self,
        source_id: &str,
    ) -> Option<Arc<WatcherHandle>> {
        let removed = self.watchers.remove(source_id).map(|(_, handle)| handle);
        REGISTERED_WATCHERS.set(self.watchers.len() as i64);
        removed
    }

    pub fn get(
        &self,
        source_id: &str,
    ) -> Option<Arc<WatcherHandle>> {
        self.watchers.get(source_id).map(|entry| entry.value().clone())
    }

    pub fn contains(
        &self,
        source_id: &str,
    ) -> bool {
        self.watchers.contains_key(source_id)
    }

    /// Registered source ids, sorted
    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.watchers.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Status of every registered watcher, sorted by source id
    pub fn snapshot(&self) -> Vec<WatcherStatus> {
        let mut statuses: Vec<WatcherStatus> = self
            .watchers
            .iter()
            .map(|entry| entry.value().status())
            .collect();
        statuses.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        statuses
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Unregisters every watcher and hands them to the caller
    pub fn drain(&self) -> Vec<Arc<WatcherHandle>> {
        let drained = self
            .source_ids()
            .into_iter()
            .filter_map(|id| self.remove(&id))
            .collect();
        REGISTERED_WATCHERS.set(self.watchers.len() as i64);
        drained
    }
}
