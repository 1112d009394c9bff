//! Feed and hub discovery.
//!
//! Given a page URL, finds the page's RSS/Atom feed through its
//! `<link rel="alternate">` elements and the hub the feed advertises with
//! `rel="hub"`, falling back to the configured default hub.

use std::sync::Arc;

use feed_rs::model::Feed;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::fetcher::PageFetcher;
use super::types::{DiscoveredFeed, ATOM_MIME_TYPE, RSS_MIME_TYPE};
use crate::error::DiscoveryError;
use crate::{BetafarmError, Result};

/// Discovers feed and hub URLs for pages.
pub struct FeedDiscovery {
    fetcher: Arc<dyn PageFetcher>,
    default_hub: String,
}

impl FeedDiscovery {
    /// Create a discovery parser using `default_hub` when a feed advertises none.
    pub fn new(fetcher: Arc<dyn PageFetcher>, default_hub: impl Into<String>) -> Self {
        Self {
            fetcher,
            default_hub: default_hub.into(),
        }
    }

    /// Discover the feed and hub of the page at `page_url`.
    ///
    /// Fails with [`DiscoveryError::NoFeed`] when the page advertises no feed
    /// and is not a feed itself, and with [`DiscoveryError::InvalidFeed`] when
    /// the advertised feed does not parse.
    pub async fn discover(&self, page_url: &str) -> Result<DiscoveredFeed> {
        let page = self.fetcher.fetch(page_url).await?;
        let base = if page.url.is_empty() { page_url } else { page.url.as_str() };

        let (feed_url, feed) = match find_feed_link(&page.text()) {
            Some(href) => {
                let feed_url = resolve_url(&href, base)?;
                debug!(page = %page_url, feed = %feed_url, "Found alternate feed link");

                let document = self.fetcher.fetch(&feed_url).await?;
                let feed = feed_rs::parser::parse(document.body.as_slice())
                    .map_err(|_| DiscoveryError::InvalidFeed(feed_url.clone()))?;
                (feed_url, feed)
            }
            None => match feed_rs::parser::parse(page.body.as_slice()) {
                // The page is the feed.
                Ok(feed) => (page_url.to_string(), feed),
                Err(_) => return Err(DiscoveryError::NoFeed(page_url.to_string()).into()),
            },
        };

        let hub_url = match find_hub_link(&feed) {
            Some(href) => resolve_url(&href, &feed_url)?,
            None => {
                debug!(feed = %feed_url, hub = %self.default_hub, "Feed advertises no hub, using default");
                self.default_hub.clone()
            }
        };

        Ok(DiscoveredFeed { feed_url, hub_url })
    }
}

/// Resolve `href` against `base`.
///
/// Absolute http(s) URLs are returned unchanged; anything else is joined to
/// the base URL.
pub fn resolve_url(href: &str, base: &str) -> Result<String> {
    let href = href.trim();
    if let Ok(absolute) = Url::parse(href) {
        if matches!(absolute.scheme(), "http" | "https") {
            return Ok(href.to_string());
        }
    }

    let base = Url::parse(base)
        .map_err(|e| BetafarmError::Validation(format!("invalid base URL {}: {}", base, e)))?;
    let joined = base
        .join(href)
        .map_err(|e| BetafarmError::Validation(format!("cannot resolve {}: {}", href, e)))?;

    Ok(joined.to_string())
}

/// Find the first `<link rel="alternate">` with an Atom or RSS type.
fn find_feed_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("link[rel][href]").ok()?;

    document.select(&selector).find_map(|element| {
        let attrs = element.value();
        let rel = attrs.attr("rel")?;
        let media_type = attrs.attr("type")?;
        if has_rel(rel, "alternate") && is_feed_type(media_type) {
            attrs.attr("href").map(str::to_string)
        } else {
            None
        }
    })
}

fn find_hub_link(feed: &Feed) -> Option<String> {
    feed.links
        .iter()
        .find(|link| link.rel.as_deref().map(|rel| has_rel(rel, "hub")).unwrap_or(false))
        .map(|link| link.href.clone())
}

fn has_rel(rel: &str, wanted: &str) -> bool {
    rel.split_ascii_whitespace()
        .any(|token| token.eq_ignore_ascii_case(wanted))
}

fn is_feed_type(media_type: &str) -> bool {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case(ATOM_MIME_TYPE) || essence.eq_ignore_ascii_case(RSS_MIME_TYPE)
}
