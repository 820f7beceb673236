//! Reconciliation manager.
//!
//! Owns the watcher registry and keeps it in line with the configuration
//! source: one watcher per enabled account, created on startup or when a
//! change notification arrives, torn down when the account disappears.

mod desired;
mod reconciler;
mod registry;

pub use desired::*;
pub use reconciler::*;
pub use registry::*;
