use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_AVATAR_REF;
use crate::constants::DEFAULT_DISPLAY_NAME;
use crate::Error;
use crate::Result;
use crate::SinkTarget;

/// Message formatting and transport parameters for notification sinks
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SinkConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// Display name used until the source profile has been read
    #[serde(default = "default_display_name")]
    pub default_display_name: String,

    /// Avatar used until the source profile has been read
    #[serde(default = "default_avatar_ref")]
    pub default_avatar_ref: String,

    /// Prefix of the message body for boosted items
    #[serde(default = "default_boosted_prefix")]
    pub boosted_prefix: String,

    /// Alternate host for preview-friendly embeds. When unset the post
    /// link keeps the host it was published under.
    #[serde(default)]
    pub embed_host: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            request_timeout_in_ms: default_request_timeout(),
            default_display_name: default_display_name(),
            default_avatar_ref: default_avatar_ref(),
            boosted_prefix: default_boosted_prefix(),
            embed_host: None,
        }
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "sink.request_timeout_in_ms must be greater than 0".into(),
            )));
        }
        if let Some(host) = &self.embed_host {
            if host.trim().is_empty() || host.contains('/') {
                return Err(Error::Config(ConfigError::Message(format!(
                    "sink.embed_host {:?} must be a bare host name",
                    host
                ))));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }
}

fn default_request_timeout() -> u64 {
    10_000
}
fn default_display_name() -> String {
    DEFAULT_DISPLAY_NAME.into()
}
fn default_avatar_ref() -> String {
    DEFAULT_AVATAR_REF.into()
}
fn default_boosted_prefix() -> String {
    "RT".into()
}

/// Operator alert channel
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AlertConfig {
    /// Webhook receiving `**LEVEL** message` alerts; alerts are only logged
    /// when unset
    #[serde(default)]
    pub webhook: Option<String>,

    #[serde(default = "default_alert_display_name")]
    pub display_name: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook: None,
            display_name: default_alert_display_name(),
        }
    }
}

impl AlertConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(webhook) = &self.webhook {
            SinkTarget::parse(webhook)?;
        }
        Ok(())
    }

    pub fn target(&self) -> Result<Option<SinkTarget>> {
        self.webhook.as_deref().map(SinkTarget::parse).transpose()
    }
}

fn default_alert_display_name() -> String {
    "feed-relay".into()
}
