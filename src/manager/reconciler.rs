use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::desired_sources;
use super::WatcherRegistry;
use crate::AlertLevel;
use crate::ChangeStream;
use crate::ConfigSource;
use crate::Error;
use crate::Result;
use crate::WatcherContext;
use crate::WatcherState;
use crate::RECONCILE_ACTIONS;
use crate::RECONCILE_PASSES;

/// What triggered a reconcile pass; used as a metric label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileTrigger {
    Startup,
    Change,
    Resync,
}

impl ReconcileTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileTrigger::Startup => "startup",
            ReconcileTrigger::Change => "change",
            ReconcileTrigger::Resync => "resync",
        }
    }
}

/// Source ids touched by one reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub removed: Vec<String>,
    /// Failed watchers torn down and constructed again
    pub replaced: Vec<String>,
    /// Construction rejected; retried on the next pass
    pub failed: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty() && self.replaced.is_empty() && self.failed.is_empty()
    }
}

/// Keeps the registry in line with the configuration records.
///
/// Passes run on startup, after change notifications and on the optional
/// resync period. They never overlap.
pub struct Manager {
    config_source: Arc<dyn ConfigSource>,
    ctx: WatcherContext,
    registry: WatcherRegistry,
    reconcile_lock: Mutex<()>,
}

impl Manager {
    pub fn new(
        config_source: Arc<dyn ConfigSource>,
        ctx: WatcherContext,
    ) -> Self {
        Self {
            config_source,
            ctx,
            registry: WatcherRegistry::new(),
            reconcile_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &WatcherRegistry {
        &self.registry
    }

    /// One reconcile pass.
    ///
    /// Only a failure to list the records fails the pass; per-source
    /// failures are collected in the report.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let _guard = self.reconcile_lock.lock().await;

        let records = self.config_source.list_all().await?;
        let desired = desired_sources(&records);
        let mut report = ReconcileReport::default();

        // 1. No longer desired
        let stale: Vec<_> = self
            .registry
            .source_ids()
            .into_iter()
            .filter(|id| !desired.contains_key(id))
            .filter_map(|id| self.registry.remove(&id))
            .collect();
        join_all(stale.iter().map(|watcher| watcher.teardown())).await;
        report.removed = stale.iter().map(|w| w.source_id().to_string()).collect();

        // 2. Failed watchers are rebuilt below
        let mut replaced = BTreeSet::new();
        for source_id in desired.keys() {
            let failed = self
                .registry
                .get(source_id)
                .is_some_and(|w| w.state() == WatcherState::Failed);
            if !failed {
                continue;
            }
            if let Some(watcher) = self.registry.remove(source_id) {
                watcher.teardown().await;
                replaced.insert(source_id.clone());
            }
        }

        // 3. Missing
        for (source_id, config) in desired {
            if self.registry.contains(&source_id) {
                continue;
            }
            match self.registry.create(config, &self.ctx) {
                Ok(_) if replaced.contains(&source_id) => report.replaced.push(source_id),
                Ok(_) => report.created.push(source_id),
                Err(e) => {
                    self.ctx.alerts.alert(
                        AlertLevel::Error,
                        &format!("Could not create watcher for {:?}: {}", source_id, e),
                    );
                    report.failed.push(source_id);
                }
            }
        }

        Ok(report)
    }

    /// Runs the control loop until `shutdown` fires or the change stream is
    /// lost, then closes every watcher.
    ///
    /// Losing the change stream is the only error returned, as
    /// [`Error::Fatal`].
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let mut changes = match self.config_source.watch_changes().await {
            Ok(changes) => changes,
            Err(e) => {
                self.ctx.alerts.alert(
                    AlertLevel::Error,
                    &format!("Could not watch configuration changes: {}", e),
                );
                self.close().await;
                return Err(Error::Fatal(format!("configuration change stream unavailable: {}", e)));
            }
        };
        self.ctx
            .alerts
            .alert(AlertLevel::Info, "Watching configuration changes");

        self.reconcile_and_report(ReconcileTrigger::Startup).await;

        let mut resync = self.ctx.settings.manager.resync_interval().map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        let result = loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("shutdown signal received");
                    break Ok(());
                }
                event = changes.next() => match event {
                    Some(Ok(change)) => {
                        debug!(key = %change.key, kind = ?change.kind, "configuration changed");
                        let ended = self.drain_pending(&mut changes);
                        if ended {
                            break Err(self.stream_lost());
                        }
                        self.reconcile_and_report(ReconcileTrigger::Change).await;
                    }
                    Some(Err(e)) => {
                        self.ctx.alerts.alert(
                            AlertLevel::Warn,
                            &format!("Configuration change stream error: {}", e),
                        );
                    }
                    None => break Err(self.stream_lost()),
                },
                _ = next_resync(&mut resync) => {
                    self.reconcile_and_report(ReconcileTrigger::Resync).await;
                }
            }
        };

        self.close().await;
        result
    }

    /// Tears down every watcher and releases the shared rendering agent.
    ///
    /// Waits for a pass in progress, so nothing it creates outlives the
    /// close.
    pub async fn close(&self) {
        let _guard = self.reconcile_lock.lock().await;

        let watchers = self.registry.drain();
        join_all(watchers.iter().map(|watcher| watcher.teardown())).await;

        if let Err(e) = self.ctx.agent.shutdown().await {
            warn!("rendering agent shutdown failed: {}", e);
        }
        info!(watchers = watchers.len(), "manager closed");
    }

    async fn reconcile_and_report(
        &self,
        trigger: ReconcileTrigger,
    ) -> Option<ReconcileReport> {
        match self.reconcile().await {
            Ok(report) => {
                RECONCILE_PASSES.with_label_values(&[trigger.as_str(), "ok"]).inc();
                for (action, ids) in [
                    ("created", &report.created),
                    ("removed", &report.removed),
                    ("replaced", &report.replaced),
                    ("failed", &report.failed),
                ] {
                    RECONCILE_ACTIONS.with_label_values(&[action]).inc_by(ids.len() as u64);
                }

                if report.is_empty() {
                    debug!(trigger = trigger.as_str(), "reconcile pass changed nothing");
                } else {
                    self.ctx.alerts.alert(
                        AlertLevel::Info,
                        &format!(
                            "Reconciled ({}): created {:?}, removed {:?}, replaced {:?}, failed {:?}",
                            trigger.as_str(),
                            report.created,
                            report.removed,
                            report.replaced,
                            report.failed
                        ),
                    );
                }
                Some(report)
            }
            Err(e) => {
                RECONCILE_PASSES.with_label_values(&[trigger.as_str(), "error"]).inc();
                self.ctx.alerts.alert(
                    AlertLevel::Warn,
                    &format!("Reconcile pass ({}) failed: {}", trigger.as_str(), e),
                );
                None
            }
        }
    }

    /// Consumes notifications that are already queued so a burst costs one
    /// pass. Returns `true` when the stream ended meanwhile.
    fn drain_pending(
        &self,
        changes: &mut ChangeStream,
    ) -> bool {
        let mut drained = 0usize;
        while let Some(next) = changes.next().now_or_never() {
            match next {
                Some(Ok(_)) => drained += 1,
                Some(Err(e)) => self.ctx.alerts.alert(
                    AlertLevel::Warn,
                    &format!("Configuration change stream error: {}", e),
                ),
                None => return true,
            }
        }
        if drained > 0 {
            debug!(drained, "collapsed queued configuration changes");
        }
        false
    }

    fn stream_lost(&self) -> Error {
        self.ctx
            .alerts
            .alert(AlertLevel::Error, "Configuration change stream ended");
        Error::Fatal("configuration change stream ended".to_string())
    }
}

async fn next_resync(resync: &mut Option<Interval>) {
    match resync {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
