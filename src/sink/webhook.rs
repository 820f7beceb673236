use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::trace;

use super::SinkMessage;
use super::SinkTarget;
use super::SinkTransport;
use crate::Result;
use crate::SinkConfig;
use crate::SinkError;

/// Chat webhook payload
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    username: &'a str,
    avatar_url: &'a str,
    content: &'a str,
}

/// Posts messages as JSON to chat webhooks
#[derive(Clone)]
pub struct WebhookTransport {
    client: Client,
}

impl WebhookTransport {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(SinkError::from)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SinkTransport for WebhookTransport {
    async fn send(
        &self,
        target: &SinkTarget,
        message: &SinkMessage,
    ) -> Result<()> {
        let payload = WebhookPayload {
            username: &message.display_name,
            avatar_url: &message.avatar_ref,
            content: &message.body,
        };

        let response = self
            .client
            .post(target.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(SinkError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                status: status.as_u16(),
            }
            .into());
        }

        trace!(%target, "webhook accepted message");
        Ok(())
    }
}
