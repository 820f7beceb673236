use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use reqwest::Url;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::extractor::extract_snapshot;
use super::extractor::read_profile;
use super::render_message;
use super::CycleOutcome;
use super::SinkDispatcher;
use super::WatcherContext;
use super::WatcherState;
use super::WatcherStatus;
use crate::plan_deliveries;
use crate::time::now_ms;
use crate::AlertLevel;
use crate::DisplayIdentity;
use crate::ItemId;
use crate::RecentIds;
use crate::RenderingError;
use crate::RenderingSession;
use crate::Result;
use crate::SinkTarget;
use crate::DELIVERED_ITEMS;
use crate::POLL_CYCLES;
use crate::POLL_CYCLE_DURATION_MS;
use crate::WATCHER_INIT_FAILURES;

/// State owned by a watcher's task. Only this task mutates it.
pub(super) struct WatcherTask {
    source_id: String,
    page_url: Url,
    ctx: WatcherContext,
    status: Arc<RwLock<WatcherStatus>>,
    /// `None` once released
    dispatcher: Option<SinkDispatcher>,
    session: Option<Box<dyn RenderingSession>>,
    watermark: ItemId,
    recent: RecentIds,
    /// Profile identity, read lazily until found
    identity: Option<DisplayIdentity>,
}

impl WatcherTask {
    pub(super) fn new(
        source_id: String,
        page_url: Url,
        sink_targets: &BTreeSet<SinkTarget>,
        ctx: WatcherContext,
        status: Arc<RwLock<WatcherStatus>>,
    ) -> Self {
        let dispatcher = SinkDispatcher::new(
            &source_id,
            sink_targets,
            ctx.transport.clone(),
            ctx.alerts.clone(),
        );
        let watcher = &ctx.settings.watcher;
        Self {
            watermark: watcher.genesis(),
            recent: RecentIds::new(watcher.recent_ids_capacity),
            source_id,
            page_url,
            dispatcher: Some(dispatcher),
            session: None,
            identity: None,
            status,
            ctx,
        }
    }

    pub(super) async fn run(
        mut self,
        cancel: CancellationToken,
    ) {
        if !self.transition(WatcherState::Initializing) {
            self.release().await;
            return;
        }

        if let Err(e) = self.initialize().await {
            WATCHER_INIT_FAILURES.with_label_values(&[&self.source_id]).inc();
            self.ctx.alerts.alert(
                AlertLevel::Error,
                &format!("Watcher for {} failed to initialize: {}", self.source_id, e),
            );
            {
                let mut status = self.status.write();
                status.failure = Some(e.to_string());
                if let Err(e) = status.transition(WatcherState::Failed) {
                    warn!(source_id = %self.source_id, "{}", e);
                }
            }
            self.release().await;
            return;
        }

        if cancel.is_cancelled() || !self.transition(WatcherState::Running) {
            self.release().await;
            self.status.write().mark_stopped();
            return;
        }
        self.ctx.alerts.alert(
            AlertLevel::Info,
            &format!("Watcher for {} running from {}", self.source_id, self.watermark),
        );

        // First tick completes immediately
        let mut ticker = interval(self.ctx.settings.watcher.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(source_id = %self.source_id, "watcher cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll_cycle().await;
                }
            }
        }

        self.release().await;
        self.status.write().mark_stopped();
        info!(source_id = %self.source_id, "watcher stopped");
    }

    fn transition(
        &self,
        next: WatcherState,
    ) -> bool {
        match self.status.write().transition(next) {
            Ok(()) => true,
            Err(e) => {
                warn!(source_id = %self.source_id, "{}", e);
                false
            }
        }
    }

    async fn initialize(&mut self) -> Result<()> {
        let session = self.ctx.agent.open(self.page_url.as_str()).await?;
        self.session = Some(session);

        self.refresh_identity().await;

        self.watermark = match self.ctx.store.get(&self.source_id).await? {
            Some(id) => id,
            None => {
                let genesis = self.ctx.settings.watcher.genesis();
                self.ctx.store.upsert(&self.source_id, genesis).await?;
                genesis
            }
        };
        self.status.write().watermark = Some(self.watermark);
        Ok(())
    }

    /// Best effort: a missing profile only means default identity for now
    async fn refresh_identity(&mut self) {
        let Some(session) = self.session.as_deref() else {
            return;
        };
        match read_profile(session, &self.ctx.settings.rendering, &self.source_id).await {
            Ok(Some(identity)) => {
                debug!(source_id = %self.source_id, name = %identity.name, "profile identity read");
                self.identity = Some(identity);
            }
            Ok(None) => warn!(source_id = %self.source_id, "profile identity not found on page"),
            Err(e) => warn!(source_id = %self.source_id, "profile identity unreadable: {}", e),
        }
    }

    fn current_identity(&self) -> DisplayIdentity {
        self.identity.clone().unwrap_or_else(|| DisplayIdentity {
            name: self.ctx.settings.sink.default_display_name.clone(),
            avatar_ref: self.ctx.settings.sink.default_avatar_ref.clone(),
        })
    }

    async fn poll_cycle(&mut self) -> CycleOutcome {
        let started = Instant::now();

        let outcome = match self.check_for_new_items().await {
            Ok(0) => CycleOutcome::NoNewItems,
            Ok(n) => CycleOutcome::Delivered(n),
            Err(e) => {
                self.ctx.alerts.alert(
                    AlertLevel::Warn,
                    &format!("Poll cycle for {} failed: {}", self.source_id, e),
                );
                CycleOutcome::Failed(e.to_string())
            }
        };

        POLL_CYCLES
            .with_label_values(&[&self.source_id, outcome.label()])
            .inc();
        POLL_CYCLE_DURATION_MS
            .with_label_values(&[&self.source_id])
            .observe(started.elapsed().as_millis() as f64);
        self.status.write().record_cycle(outcome.clone(), now_ms());
        outcome
    }

    async fn check_for_new_items(&mut self) -> Result<usize> {
        let wait = self.ctx.settings.rendering.wait_policy();
        self.session
            .as_mut()
            .ok_or(RenderingError::SessionClosed)?
            .refresh(wait)
            .await?;

        if self.identity.is_none() {
            self.refresh_identity().await;
        }
        let identity = self.current_identity();

        let session = self.session.as_deref().ok_or(RenderingError::SessionClosed)?;
        let snapshot = extract_snapshot(
            session,
            &self.ctx.settings.rendering,
            &self.page_url,
            &identity,
        )
        .await?;

        let plan = plan_deliveries(
            &snapshot,
            self.watermark,
            &self.recent,
            self.ctx.settings.watcher.timestamp_tolerance_in_ms,
        );
        debug!(
            source_id = %self.source_id,
            candidates = snapshot.len(),
            new = plan.deliveries.len(),
            "snapshot checked"
        );

        let mut delivered = 0;
        for item in plan.deliveries {
            let message = render_message(&item, &self.ctx.settings.sink);
            if let Some(dispatcher) = &self.dispatcher {
                dispatcher.dispatch(&message);
            }
            DELIVERED_ITEMS.with_label_values(&[&self.source_id]).inc();
            delivered += 1;

            // Advanced before persisting: no redelivery on a store failure
            self.recent.push(item.id);
            self.watermark = self.watermark.max(item.id);
            self.status.write().record_delivery(self.watermark);

            self.ctx.store.upsert(&self.source_id, self.watermark).await?;
        }

        Ok(delivered)
    }

    /// Closes the session and drains the sink workers
    async fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!(source_id = %self.source_id, "closing rendering session failed: {}", e);
            }
        }

        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.close().await;
        }
    }
}
