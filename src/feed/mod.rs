//! Feed domain model: item ids and their embedded timestamps, the recency
//! cache, and the pure dedup/ordering engine.

mod dedup;
mod item;
mod recent_ids;

pub use dedup::*;
pub use item::*;
pub use recent_ids::*;
