//! CSS selection over raw markup.
//!
//! `Html` is not `Send`, so parsing stays inside these synchronous helpers
//! and never lives across an await point.

use scraper::ElementRef;
use scraper::Html;
use scraper::Selector;

use crate::ElementHandle;
use crate::RenderingError;
use crate::Result;

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| {
        RenderingError::InvalidSelector {
            selector: selector.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

pub(crate) fn select_in_document(
    markup: &str,
    selector: &str,
) -> Result<Vec<ElementHandle>> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(markup);
    Ok(document
        .select(&selector)
        .map(|element| ElementHandle::new(element.html()))
        .collect())
}

pub(crate) fn select_in_fragment(
    markup: &str,
    selector: &str,
) -> Result<Vec<ElementHandle>> {
    let selector = parse_selector(selector)?;
    let fragment = Html::parse_fragment(markup);
    Ok(fragment
        .root_element()
        .select(&selector)
        .map(|element| ElementHandle::new(element.html()))
        .collect())
}

pub(crate) fn element_text(markup: &str) -> String {
    let fragment = Html::parse_fragment(markup);
    let text: String = fragment.root_element().text().collect();
    text.trim().to_string()
}

pub(crate) fn element_attribute(
    markup: &str,
    name: &str,
) -> Result<Option<String>> {
    let fragment = Html::parse_fragment(markup);
    let element = fragment
        .root_element()
        .children()
        .find_map(ElementRef::wrap)
        .ok_or_else(|| RenderingError::ElementNotFound(markup.chars().take(64).collect()))?;
    Ok(element.value().attr(name).map(str::to_string))
}
