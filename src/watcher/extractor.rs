//! Item extraction contract: turns the rendered feed page into an ordered
//! snapshot of [`Item`]s, and reads the source's profile identity.

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use tracing::trace;

use crate::DisplayIdentity;
use crate::ElementHandle;
use crate::Item;
use crate::ItemId;
use crate::RenderingConfig;
use crate::RenderingError;
use crate::RenderingSession;
use crate::Result;

lazy_static! {
    static ref STATUS_LINK: Regex = Regex::new(r"/status/(\d+)").expect("valid status link pattern");
}

/// Item id carried by a permalink such as `/alice/status/123?s=20`
pub(crate) fn status_id(href: &str) -> Option<ItemId> {
    STATUS_LINK
        .captures(href)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Reads every item on the page, oldest first.
///
/// Fails with [`RenderingError::ElementNotFound`] when the page shows no item
/// element at all. Item elements without a status link are ignored.
pub(crate) async fn extract_snapshot(
    session: &dyn RenderingSession,
    config: &RenderingConfig,
    page_url: &Url,
    identity: &DisplayIdentity,
) -> Result<Vec<Item>> {
    let elements = session.query_all(&config.item_selector).await?;
    if elements.is_empty() {
        return Err(RenderingError::ElementNotFound(config.item_selector.clone()).into());
    }

    let mut items = Vec::with_capacity(elements.len());
    for element in &elements {
        if let Some(item) = extract_item(session, config, page_url, identity, element).await? {
            items.push(item);
        }
    }

    // The page lists newest first
    items.reverse();
    Ok(items)
}

async fn extract_item(
    session: &dyn RenderingSession,
    config: &RenderingConfig,
    page_url: &Url,
    identity: &DisplayIdentity,
    element: &ElementHandle,
) -> Result<Option<Item>> {
    let mut is_boosted = false;
    let mut is_pinned = false;
    for label in session.query_within(element, &config.context_selector).await? {
        let text = session.extract_text(&label).await?;
        is_boosted |= text.contains(&config.boosted_marker);
        is_pinned |= text.contains(&config.pinned_marker);
    }

    for anchor in session.query_within(element, &config.link_selector).await? {
        let Some(href) = session.extract_attribute(&anchor, "href").await? else {
            continue;
        };
        let Some(id) = status_id(&href) else {
            continue;
        };
        let link = page_url
            .join(&href)
            .map_err(|e| RenderingError::InvalidUrl(format!("{href}: {e}")))?;

        return Ok(Some(Item {
            id,
            is_boosted,
            is_pinned,
            identity: identity.clone(),
            link: link.into(),
        }));
    }

    trace!("item element without status link ignored");
    Ok(None)
}

/// Display name and avatar of the watched source, `None` while the page does
/// not show them
pub(crate) async fn read_profile(
    session: &dyn RenderingSession,
    config: &RenderingConfig,
    source_id: &str,
) -> Result<Option<DisplayIdentity>> {
    let Some(name_element) = session
        .query_all(&config.profile_name_selector)
        .await?
        .into_iter()
        .next()
    else {
        return Ok(None);
    };
    let name = session.extract_text(&name_element).await?;
    if name.is_empty() {
        return Ok(None);
    }

    let avatar_selector = config.profile_avatar_selector_for(source_id);
    let Some(avatar_element) = session.query_all(&avatar_selector).await?.into_iter().next() else {
        return Ok(None);
    };
    let Some(avatar_ref) = session
        .extract_attribute(&avatar_element, &config.profile_avatar_attribute)
        .await?
    else {
        return Ok(None);
    };

    Ok(Some(DisplayIdentity { name, avatar_ref }))
}
