use std::collections::BTreeSet;
use std::sync::Arc;

use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::async_task::spawn_task;
use crate::AlertChannel;
use crate::AlertLevel;
use crate::Item;
use crate::SinkConfig;
use crate::SinkMessage;
use crate::SinkTarget;
use crate::SinkTransport;
use crate::SINK_SENDS;

/// Fans deliveries of one source out to all of its sinks.
///
/// Every sink has its own worker and unbounded queue. Messages reach each
/// sink in the order they were dispatched.
pub struct SinkDispatcher {
    queues: Vec<(SinkTarget, mpsc::UnboundedSender<SinkMessage>)>,
    workers: Vec<JoinHandle<()>>,
}

impl SinkDispatcher {
    pub fn new(
        source_id: &str,
        targets: &BTreeSet<SinkTarget>,
        transport: Arc<dyn SinkTransport>,
        alerts: Arc<dyn AlertChannel>,
    ) -> Self {
        let mut queues = Vec::with_capacity(targets.len());
        let mut workers = Vec::with_capacity(targets.len());

        for target in targets {
            let (tx, rx) = mpsc::unbounded_channel();
            let worker = SinkWorker {
                source_id: source_id.to_string(),
                target: target.clone(),
                transport: transport.clone(),
                alerts: alerts.clone(),
            };
            spawn_task(
                &format!("sink worker {source_id} -> {target}"),
                move || async move {
                    worker.run(rx).await;
                    Ok(())
                },
                Some(&mut workers),
            );
            queues.push((target.clone(), tx));
        }

        Self { queues, workers }
    }

    pub fn sink_count(&self) -> usize {
        self.queues.len()
    }

    /// Enqueues `message` for every sink without waiting for any send.
    /// Returns how many sinks accepted it.
    pub fn dispatch(
        &self,
        message: &SinkMessage,
    ) -> usize {
        let mut accepted = 0;
        for (target, tx) in &self.queues {
            if tx.send(message.clone()).is_ok() {
                accepted += 1;
            } else {
                warn!(%target, "sink worker is gone, message dropped");
            }
        }
        accepted
    }

    /// Stops accepting messages and waits for every queued one to be sent
    pub async fn close(mut self) {
        self.queues.clear();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!("sink worker ended abnormally: {:?}", e);
            }
        }
    }
}

struct SinkWorker {
    source_id: String,
    target: SinkTarget,
    transport: Arc<dyn SinkTransport>,
    alerts: Arc<dyn AlertChannel>,
}

impl SinkWorker {
    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<SinkMessage>,
    ) {
        while let Some(message) = rx.recv().await {
            match self.transport.send(&self.target, &message).await {
                Ok(()) => {
                    SINK_SENDS.with_label_values(&[&self.source_id, "ok"]).inc();
                    debug!(source_id = %self.source_id, target = %self.target, "delivered: {}", message.body);
                }
                Err(e) => {
                    SINK_SENDS.with_label_values(&[&self.source_id, "error"]).inc();
                    self.alerts.alert(
                        AlertLevel::Warn,
                        &format!(
                            "Delivery of {} to {} for {} failed: {}",
                            message.body, self.target, self.source_id, e
                        ),
                    );
                }
            }
        }
    }
}

/// Builds the message posted for `item`.
///
/// The body is the canonical post url, prefixed for boosted items. Query
/// string and fragment are dropped and the host is swapped for
/// `embed_host` when one is configured.
pub fn render_message(
    item: &Item,
    config: &SinkConfig,
) -> SinkMessage {
    let url = canonical_link(&item.link, config.embed_host.as_deref());
    let body = if item.is_boosted {
        format!("{} {}", config.boosted_prefix, url)
    } else {
        url
    };

    SinkMessage {
        display_name: item.identity.name.clone(),
        avatar_ref: item.identity.avatar_ref.clone(),
        body,
    }
}

pub(crate) fn canonical_link(
    link: &str,
    embed_host: Option<&str>,
) -> String {
    let Ok(mut url) = Url::parse(link) else {
        // Not absolute; best effort on the raw text
        let end = link.find(['?', '#']).unwrap_or(link.len());
        return link[..end].to_string();
    };

    url.set_query(None);
    url.set_fragment(None);
    if let Some(host) = embed_host {
        if let Err(e) = url.set_host(Some(host)) {
            warn!(host, "embed host rejected: {}", e);
        }
    }
    url.into()
}
