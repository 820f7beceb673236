use std::collections::VecDeque;

use crate::ItemId;

/// Bounded FIFO of recently delivered ids. Absorbs near-term reordering of
/// the page that a single watermark cannot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentIds {
    capacity: usize,
    ids: VecDeque<ItemId>,
}

impl RecentIds {
    /// `capacity` is clamped to at least 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ids: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn contains(
        &self,
        id: &ItemId,
    ) -> bool {
        self.ids.contains(id)
    }

    /// Appends `id`, evicting the oldest entry once over capacity.
    /// Returns the evicted id, if any.
    pub fn push(
        &mut self,
        id: ItemId,
    ) -> Option<ItemId> {
        self.ids.push_back(id);
        if self.ids.len() > self.capacity {
            self.ids.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &ItemId> {
        self.ids.iter()
    }
}
