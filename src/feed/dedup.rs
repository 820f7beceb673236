//! Dedup/ordering engine.
//!
//! Decides, from one snapshot and the watcher's cursor state, which items are
//! new and in which order they are delivered. Every qualifying item of the
//! snapshot is delivered, oldest first; each delivery advances the watermark
//! before the next item is judged, so the watermark never moves backward and
//! no id is planned twice.

use tracing::trace;

use crate::Item;
use crate::ItemId;
use crate::RecentIds;

/// Why an item of the snapshot is not delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Decoded time is not past the watermark (plus tolerance)
    NotNewer,
    /// Pinned items are never announced
    Pinned,
    /// Delivered recently with an unchanged watermark
    RecentlyDelivered,
}

/// Outcome of [`plan_deliveries`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPlan {
    /// Items to deliver, in delivery order
    pub deliveries: Vec<Item>,
    /// Watermark after every planned delivery
    pub watermark: ItemId,
}

impl DeliveryPlan {
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }
}

/// Returns why `item` must be skipped, or `None` when it is new.
pub fn skip_reason(
    item: &Item,
    watermark: ItemId,
    recent: &RecentIds,
    tolerance_ms: u64,
) -> Option<SkipReason> {
    if item.id.timestamp_ms() <= watermark.timestamp_ms_ceil().saturating_add(tolerance_ms) {
        return Some(SkipReason::NotNewer);
    }
    if item.is_pinned {
        return Some(SkipReason::Pinned);
    }
    if recent.contains(&item.id) {
        return Some(SkipReason::RecentlyDelivered);
    }
    None
}

/// Pure planning step: `(snapshot, watermark, recent)` → `(new items, new watermark)`.
///
/// `snapshot` must already be oldest first.
pub fn plan_deliveries(
    snapshot: &[Item],
    watermark: ItemId,
    recent: &RecentIds,
    tolerance_ms: u64,
) -> DeliveryPlan {
    let mut recent = recent.clone();
    let mut cursor = watermark;
    let mut deliveries = Vec::new();

    for item in snapshot {
        if let Some(reason) = skip_reason(item, cursor, &recent, tolerance_ms) {
            trace!(id = %item.id, ?reason, "skip item");
            continue;
        }

        recent.push(item.id);
        cursor = cursor.max(item.id);
        deliveries.push(item.clone());
    }

    DeliveryPlan {
        deliveries,
        watermark: cursor,
    }
}
