use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;
use crate::WaitPolicy;

/// Placeholder replaced by the source id in url and selector templates
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// Page addressing and the selectors of the item extraction contract.
///
/// Markup changes independently of the relay, so every selector lives here
/// rather than in code.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RenderingConfig {
    /// Url of a source's feed page, `{source}` is substituted
    #[serde(default = "default_page_url_template")]
    pub page_url_template: String,

    /// One element per feed item, newest first
    #[serde(default = "default_item_selector")]
    pub item_selector: String,

    /// Labels such as "Retweeted" or "Pinned Tweet", queried within an item
    #[serde(default = "default_context_selector")]
    pub context_selector: String,

    /// Author/permalink anchors, queried within an item
    #[serde(default = "default_link_selector")]
    pub link_selector: String,

    /// Context label text marking a boosted item
    #[serde(default = "default_boosted_marker")]
    pub boosted_marker: String,

    /// Context label text marking a pinned item
    #[serde(default = "default_pinned_marker")]
    pub pinned_marker: String,

    #[serde(default = "default_profile_name_selector")]
    pub profile_name_selector: String,

    /// `{source}` is substituted
    #[serde(default = "default_profile_avatar_selector")]
    pub profile_avatar_selector: String,

    #[serde(default = "default_profile_avatar_attribute")]
    pub profile_avatar_attribute: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout of a single page fetch
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// Upper bound for one content-stability wait
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_in_ms: u64,

    /// Maximum number of extra fetches while waiting for stable content
    #[serde(default = "default_settle_rounds")]
    pub settle_rounds: u32,

    #[serde(default = "default_settle_delay")]
    pub settle_delay_in_ms: u64,
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            page_url_template: default_page_url_template(),
            item_selector: default_item_selector(),
            context_selector: default_context_selector(),
            link_selector: default_link_selector(),
            boosted_marker: default_boosted_marker(),
            pinned_marker: default_pinned_marker(),
            profile_name_selector: default_profile_name_selector(),
            profile_avatar_selector: default_profile_avatar_selector(),
            profile_avatar_attribute: default_profile_avatar_attribute(),
            user_agent: default_user_agent(),
            request_timeout_in_ms: default_request_timeout(),
            wait_timeout_in_ms: default_wait_timeout(),
            settle_rounds: default_settle_rounds(),
            settle_delay_in_ms: default_settle_delay(),
        }
    }
}

impl RenderingConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.page_url_template.contains(SOURCE_PLACEHOLDER) {
            return Err(Error::Config(ConfigError::Message(format!(
                "rendering.page_url_template must contain {}",
                SOURCE_PLACEHOLDER
            ))));
        }

        for (name, selector) in [
            ("item_selector", &self.item_selector),
            ("context_selector", &self.context_selector),
            ("link_selector", &self.link_selector),
            ("profile_name_selector", &self.profile_name_selector),
            ("profile_avatar_selector", &self.profile_avatar_selector),
        ] {
            if selector.trim().is_empty() {
                return Err(Error::Config(ConfigError::Message(format!(
                    "rendering.{} cannot be empty",
                    name
                ))));
            }
        }

        if self.request_timeout_in_ms == 0 || self.wait_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "rendering timeouts must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    pub fn page_url(
        &self,
        source_id: &str,
    ) -> String {
        self.page_url_template.replace(SOURCE_PLACEHOLDER, source_id)
    }

    pub fn profile_avatar_selector_for(
        &self,
        source_id: &str,
    ) -> String {
        self.profile_avatar_selector.replace(SOURCE_PLACEHOLDER, source_id)
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_millis(self.wait_timeout_in_ms),
            settle_rounds: self.settle_rounds,
            settle_delay: Duration::from_millis(self.settle_delay_in_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }
}

fn default_page_url_template() -> String {
    "https://twitter.com/{source}".into()
}
fn default_item_selector() -> String {
    "[data-testid=tweet]".into()
}
fn default_context_selector() -> String {
    "[data-testid=socialContext]".into()
}
fn default_link_selector() -> String {
    "div[data-testid=User-Name] a".into()
}
fn default_boosted_marker() -> String {
    "Retweeted".into()
}
fn default_pinned_marker() -> String {
    "Pinned Tweet".into()
}
fn default_profile_name_selector() -> String {
    "div[data-testid=UserName] span".into()
}
fn default_profile_avatar_selector() -> String {
    "[href=\"/{source}/photo\"] img".into()
}
fn default_profile_avatar_attribute() -> String {
    "src".into()
}
fn default_user_agent() -> String {
    concat!("feed-relay/", env!("CARGO_PKG_VERSION")).into()
}
fn default_request_timeout() -> u64 {
    15_000
}
fn default_wait_timeout() -> u64 {
    30_000
}
fn default_settle_rounds() -> u32 {
    2
}
fn default_settle_delay() -> u64 {
    500
}
