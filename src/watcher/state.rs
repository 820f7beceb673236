use serde::Serialize;

use crate::ItemId;
use crate::Result;
use crate::WatcherError;

/// Lifecycle of a watcher.
///
/// ```text
/// Constructing -> Initializing -> Running -> Stopped
///                      |                       ^
///                      +------> Failed --------+
/// ```
///
/// Any live state may also go straight to `Stopped` on teardown. `Stopped`
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherState {
    Constructing,
    Initializing,
    Running,
    Stopped,
    Failed,
}

impl WatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatcherState::Constructing => "constructing",
            WatcherState::Initializing => "initializing",
            WatcherState::Running => "running",
            WatcherState::Stopped => "stopped",
            WatcherState::Failed => "failed",
        }
    }

    pub fn can_transition_to(
        &self,
        next: WatcherState,
    ) -> bool {
        use WatcherState::*;
        matches!(
            (self, next),
            (Constructing, Initializing)
                | (Initializing, Running)
                | (Initializing, Failed)
                | (Constructing | Initializing | Running | Failed, Stopped)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WatcherState::Stopped)
    }
}

/// What one poll cycle amounted to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Number of items handed to the dispatcher
    Delivered(usize),
    NoNewItems,
    /// The cycle stopped early; the next tick tries again
    Failed(String),
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Delivered(_) => "delivered",
            CycleOutcome::NoNewItems => "empty",
            CycleOutcome::Failed(_) => "failed",
        }
    }
}

/// Status of one watcher, written by its own task and read by the manager
/// and the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatus {
    pub source_id: String,
    pub state: WatcherState,
    /// In-memory watermark, known once initialized
    pub watermark: Option<ItemId>,
    pub delivered_total: u64,
    pub cycles: u64,
    pub last_cycle: Option<CycleOutcome>,
    pub last_cycle_at_ms: Option<u64>,
    /// Why initialization failed
    pub failure: Option<String>,
}

impl WatcherStatus {
    pub fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            state: WatcherState::Constructing,
            watermark: None,
            delivered_total: 0,
            cycles: 0,
            last_cycle: None,
            last_cycle_at_ms: None,
            failure: None,
        }
    }

    pub fn transition(
        &mut self,
        next: WatcherState,
    ) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(WatcherError::InvalidTransition {
                from: self.state.as_str(),
                to: next.as_str(),
            }
            .into());
        }
        self.state = next;
        Ok(())
    }

    /// Moves to `Stopped` unless already there
    pub fn mark_stopped(&mut self) {
        if !self.state.is_terminal() {
            self.state = WatcherState::Stopped;
        }
    }

    /// One item handed to the dispatcher and `watermark` advanced past it
    pub fn record_delivery(
        &mut self,
        watermark: ItemId,
    ) {
        self.delivered_total += 1;
        self.watermark = Some(watermark);
    }

    pub fn record_cycle(
        &mut self,
        outcome: CycleOutcome,
        at_ms: u64,
    ) {
        self.cycles += 1;
        self.last_cycle = Some(outcome);
        self.last_cycle_at_ms = Some(at_ms);
    }
}
