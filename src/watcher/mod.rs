//! Per-source watcher.
//!
//! A watcher owns one rendering session, an in-memory watermark and recency
//! cache, and a sink dispatcher. Its task initializes once, then runs a
//! poll-check-deliver cycle on a fixed interval starting immediately.
//! Cycles of one watcher never overlap.

mod dispatcher;
mod extractor;
mod handle;
mod state;
mod task;

pub use dispatcher::*;
pub use handle::*;
pub use state::*;


use std::collections::BTreeSet;
use std::sync::Arc;

use crate::AlertChannel;
use crate::RenderingAgent;
use crate::Settings;
use crate::SinkTarget;
use crate::SinkTransport;
use crate::WatermarkStore;

/// Desired configuration of one watched source, derived from the
/// configuration records on every reconcile pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub source_id: String,
    pub enabled: bool,
    pub sink_targets: BTreeSet<SinkTarget>,
}

/// Collaborators shared by every watcher
#[derive(Clone)]
pub struct WatcherContext {
    pub agent: Arc<dyn RenderingAgent>,
    pub store: Arc<dyn WatermarkStore>,
    pub transport: Arc<dyn SinkTransport>,
    pub alerts: Arc<dyn AlertChannel>,
    pub settings: Arc<Settings>,
}
