use async_trait::async_trait;
use reqwest::Client;
use reqwest::Url;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::markup::element_attribute;
use super::markup::element_text;
use super::markup::select_in_document;
use super::markup::select_in_fragment;
use super::ElementHandle;
use super::RenderingAgent;
use super::RenderingSession;
use super::WaitPolicy;
use crate::RenderingConfig;
use crate::RenderingError;
use crate::Result;

/// Rendering agent backed by plain HTTP fetches and CSS selection over the
/// returned markup.
///
/// Content stability is approximated by re-fetching until two consecutive
/// responses are identical.
pub struct HttpRenderingAgent {
    client: Client,
    shutdown: CancellationToken,
}

impl HttpRenderingAgent {
    pub fn new(config: &RenderingConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()
            .map_err(RenderingError::from)?;

        Ok(Self {
            client,
            shutdown: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl RenderingAgent for HttpRenderingAgent {
    async fn open(
        &self,
        url: &str,
    ) -> Result<Box<dyn RenderingSession>> {
        if self.shutdown.is_cancelled() {
            return Err(RenderingError::SessionClosed.into());
        }
        let url = Url::parse(url).map_err(|e| RenderingError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RenderingError::InvalidUrl(url.to_string()).into());
        }

        let markup = fetch(&self.client, url.as_str()).await?;
        debug!(%url, bytes = markup.len(), "rendering session opened");

        Ok(Box::new(HttpRenderingSession {
            client: self.client.clone(),
            url,
            markup: Some(markup),
            agent_shutdown: self.shutdown.clone(),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        Ok(())
    }
}

pub struct HttpRenderingSession {
    client: Client,
    url: Url,
    /// `None` once closed
    markup: Option<String>,
    agent_shutdown: CancellationToken,
}

impl HttpRenderingSession {
    fn document(&self) -> Result<&str> {
        if self.agent_shutdown.is_cancelled() {
            return Err(RenderingError::SessionClosed.into());
        }
        self.markup
            .as_deref()
            .ok_or_else(|| RenderingError::SessionClosed.into())
    }

    fn ensure_open(&self) -> Result<()> {
        self.document().map(|_| ())
    }
}

#[async_trait]
impl RenderingSession for HttpRenderingSession {
    async fn refresh(
        &mut self,
        wait: WaitPolicy,
    ) -> Result<()> {
        self.ensure_open()?;

        let client = &self.client;
        let url = self.url.as_str();
        let settled = timeout(wait.timeout, async {
            let mut current = fetch(client, url).await?;
            for round in 0..wait.settle_rounds {
                sleep(wait.settle_delay).await;
                let next = fetch(client, url).await?;
                if next == current {
                    trace!(url, round, "page settled");
                    break;
                }
                current = next;
            }
            Ok::<_, crate::Error>(current)
        })
        .await
        .map_err(|_| RenderingError::Timeout(wait.timeout))??;

        self.markup = Some(settled);
        Ok(())
    }

    async fn query_all(
        &self,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        select_in_document(self.document()?, selector)
    }

    async fn query_within(
        &self,
        scope: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        self.ensure_open()?;
        select_in_fragment(scope.markup(), selector)
    }

    async fn extract_text(
        &self,
        element: &ElementHandle,
    ) -> Result<String> {
        self.ensure_open()?;
        Ok(element_text(element.markup()))
    }

    async fn extract_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>> {
        self.ensure_open()?;
        element_attribute(element.markup(), name)
    }

    async fn close(&mut self) -> Result<()> {
        if self.markup.take().is_some() {
            debug!(url = %self.url, "rendering session closed");
        }
        Ok(())
    }
}

async fn fetch(
    client: &Client,
    url: &str,
) -> Result<String> {
    let response = client.get(url).send().await.map_err(RenderingError::from)?;
    let status = response.status();
    if !status.is_success() {
        return Err(RenderingError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }
        .into());
    }
    Ok(response.text().await.map_err(RenderingError::from)?)
}
