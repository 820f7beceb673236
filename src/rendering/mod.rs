//! Rendering capability used by watchers to read a feed page.
//!
//! An agent is shared by every watcher and issues one session per watcher.
//! A session is bound to one page; element handles it returns are opaque
//! and only meaningful to the session that produced them.

mod http_agent;
pub(crate) mod markup;
pub use http_agent::*;


use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// How long and how hard a session waits for page content to stop changing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Upper bound for the whole wait
    pub timeout: Duration,
    /// Maximum number of extra reads while content is still changing
    pub settle_rounds: u32,
    /// Pause between two reads
    pub settle_delay: Duration,
}

/// Opaque reference to one rendered element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(markup: impl Into<String>) -> Self {
        ElementHandle(markup.into())
    }

    pub(crate) fn markup(&self) -> &str {
        &self.0
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RenderingAgent: Send + Sync + 'static {
    /// Opens a session scoped to `url`
    async fn open(
        &self,
        url: &str,
    ) -> Result<Box<dyn RenderingSession>>;

    /// Releases agent wide resources. Sessions opened before are unusable
    /// afterwards.
    async fn shutdown(&self) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RenderingSession: Send + Sync + 'static {
    /// Reloads the page and waits for its content to settle
    async fn refresh(
        &mut self,
        wait: WaitPolicy,
    ) -> Result<()>;

    /// Every element of the page matching `selector`, in document order
    async fn query_all(
        &self,
        selector: &str,
    ) -> Result<Vec<ElementHandle>>;

    /// Every element inside `scope` matching `selector`, in document order
    async fn query_within(
        &self,
        scope: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>>;

    async fn extract_text(
        &self,
        element: &ElementHandle,
    ) -> Result<String>;

    /// `None` when the element has no such attribute
    async fn extract_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>>;

    /// Idempotent
    async fn close(&mut self) -> Result<()>;
}
