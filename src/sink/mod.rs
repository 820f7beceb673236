//! Notification sinks.
//!
//! A sink is an external endpoint (a chat webhook) identified by a
//! [`SinkTarget`]. Delivery is best effort: the transport reports failures,
//! nobody retries them.

mod webhook;
pub use webhook::*;


use std::fmt;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Url;
use serde::Deserialize;
use serde::Serialize;

use crate::ConvertError;
use crate::Result;

/// Absolute http(s) endpoint of a sink.
///
/// Webhook urls embed their credentials, so `Display` and `Debug` only show
/// the scheme and host.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SinkTarget(String);

impl SinkTarget {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || ConvertError::InvalidSinkTarget(raw.to_string());
        let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(invalid().into());
        }
        Ok(SinkTarget(url.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `scheme://host/…`
    pub fn redacted(&self) -> String {
        match Url::parse(&self.0) {
            Ok(url) => format!("{}://{}/…", url.scheme(), url.host_str().unwrap_or_default()),
            Err(_) => "…".to_string(),
        }
    }
}

impl fmt::Display for SinkTarget {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for SinkTarget {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("SinkTarget").field(&self.redacted()).finish()
    }
}

impl From<SinkTarget> for String {
    fn from(target: SinkTarget) -> Self {
        target.0
    }
}

impl TryFrom<String> for SinkTarget {
    type Error = ConvertError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        SinkTarget::parse(&value).map_err(|_| ConvertError::InvalidSinkTarget(value))
    }
}

/// One message as posted to a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkMessage {
    pub display_name: String,
    pub avatar_ref: String,
    pub body: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SinkTransport: Send + Sync + 'static {
    async fn send(
        &self,
        target: &SinkTarget,
        message: &SinkMessage,
    ) -> Result<()>;
}
