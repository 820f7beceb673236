//! Operator alerting.
//!
//! Every alert is a `tracing` event. When an alert webhook is configured it is
//! also posted there as `**LEVEL** message`, without waiting for the post.


use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::AlertConfig;
use crate::Result;
use crate::SinkMessage;
use crate::SinkTarget;
use crate::SinkTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Debug => "DEBUG",
            AlertLevel::Info => "INFO",
            AlertLevel::Warn => "WARN",
            AlertLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg_attr(test, automock)]
pub trait AlertChannel: Send + Sync + 'static {
    /// Never blocks on the remote channel
    fn alert(
        &self,
        level: AlertLevel,
        message: &str,
    );
}

/// Logs alerts and forwards them to an optional webhook
pub struct WebhookAlerts {
    display_name: String,
    avatar_ref: String,
    target: Option<SinkTarget>,
    transport: Arc<dyn SinkTransport>,
}

impl WebhookAlerts {
    pub fn new(
        config: &AlertConfig,
        avatar_ref: String,
        transport: Arc<dyn SinkTransport>,
    ) -> Result<Self> {
        Ok(Self {
            display_name: config.display_name.clone(),
            avatar_ref,
            target: config.target()?,
            transport,
        })
    }
}

impl AlertChannel for WebhookAlerts {
    fn alert(
        &self,
        level: AlertLevel,
        message: &str,
    ) {
        match level {
            AlertLevel::Debug => debug!(alert = true, "{message}"),
            AlertLevel::Info => info!(alert = true, "{message}"),
            AlertLevel::Warn => warn!(alert = true, "{message}"),
            AlertLevel::Error => error!(alert = true, "{message}"),
        }

        let Some(target) = self.target.clone() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let transport = self.transport.clone();
        let message = SinkMessage {
            display_name: self.display_name.clone(),
            avatar_ref: self.avatar_ref.clone(),
            body: format!("**{level}** {message}"),
        };
        runtime.spawn(async move {
            if let Err(e) = transport.send(&target, &message).await {
                // Not re-alerted, that could loop
                warn!(%target, "alert delivery failed: {:?}", e);
            }
        });
    }
}
