//! Feed relay.
//!
//! Watches a dynamic set of feed pages and relays every newly published
//! post to webhook sinks, once per post and in publication order, across
//! restarts.
//!
//! - [`Manager`] keeps one [`WatcherHandle`] per enabled account of the
//!   configuration records.
//! - Each watcher polls its page through a [`RenderingSession`], plans
//!   deliveries with [`plan_deliveries`] against a persisted watermark and
//!   fans them out through its [`SinkDispatcher`].

mod admin;
mod alerts;
mod config;
mod errors;
mod feed;
mod manager;
mod metrics;
mod rendering;
mod sink;
mod storage;
mod watcher;

pub mod constants;
pub mod utils;

pub use admin::*;
pub use alerts::*;
pub use config::*;
pub use errors::*;
pub use feed::*;
pub use manager::*;
pub use metrics::*;
pub use rendering::*;
pub use sink::*;
pub use storage::*;
pub use utils::*;
pub use watcher::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
