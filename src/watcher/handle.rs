use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Url;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::task::WatcherTask;
use super::SourceConfig;
use super::WatcherContext;
use super::WatcherState;
use super::WatcherStatus;
use crate::Result;
use crate::Settings;
use crate::SinkTarget;
use crate::WatcherError;

/// Owner side of a running watcher.
///
/// Dropping the handle cancels the watcher's schedule; [`teardown`] also
/// waits for an in-flight cycle and for the session to be released.
///
/// [`teardown`]: WatcherHandle::teardown
pub struct WatcherHandle {
    source_id: String,
    sink_targets: BTreeSet<SinkTarget>,
    status: Arc<RwLock<WatcherStatus>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("source_id", &self.source_id)
            .field("state", &self.state())
            .finish()
    }
}

impl WatcherHandle {
    /// Construction checks. Nothing is acquired before they pass.
    pub fn validate(
        config: &SourceConfig,
        settings: &Settings,
    ) -> Result<Url> {
        if config.source_id.trim().is_empty() {
            return Err(WatcherError::EmptySourceId.into());
        }
        if config.sink_targets.is_empty() {
            return Err(WatcherError::NoSinkTargets {
                source_id: config.source_id.clone(),
            }
            .into());
        }

        let raw = settings.rendering.page_url(&config.source_id);
        Url::parse(&raw).map_err(|e| {
            WatcherError::InvalidPageUrl {
                source_id: config.source_id.clone(),
                reason: format!("{raw}: {e}"),
            }
            .into()
        })
    }

    /// Validates `config` and spawns the watcher task. Initialization
    /// happens on the task; follow it through [`WatcherHandle::state`].
    pub fn start(
        config: SourceConfig,
        ctx: WatcherContext,
    ) -> Result<Arc<Self>> {
        let page_url = Self::validate(&config, &ctx.settings)?;

        let status = Arc::new(RwLock::new(WatcherStatus::new(&config.source_id)));
        let cancel = CancellationToken::new();
        let task = WatcherTask::new(
            config.source_id.clone(),
            page_url,
            &config.sink_targets,
            ctx,
            status.clone(),
        );
        let join = tokio::spawn(task.run(cancel.clone()));
        debug!(source_id = %config.source_id, "watcher spawned");

        Ok(Arc::new(Self {
            source_id: config.source_id,
            sink_targets: config.sink_targets,
            status,
            cancel,
            task: Mutex::new(Some(join)),
        }))
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn sink_targets(&self) -> &BTreeSet<SinkTarget> {
        &self.sink_targets
    }

    pub fn state(&self) -> WatcherState {
        self.status.read().state
    }

    pub fn status(&self) -> WatcherStatus {
        self.status.read().clone()
    }

    /// Cancels the schedule, lets an in-flight cycle finish, then releases
    /// the rendering session and the sink workers. Idempotent; concurrent
    /// callers all return once the watcher is stopped.
    pub async fn teardown(&self) {
        self.cancel.cancel();

        let mut task = self.task.lock().await;
        if let Some(join) = task.take() {
            if let Err(e) = join.await {
                warn!(source_id = %self.source_id, "watcher task ended abnormally: {:?}", e);
            }
        }
        self.status.write().mark_stopped();
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
