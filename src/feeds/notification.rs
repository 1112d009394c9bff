//! Hub notification handling.
//!
//! A notification is the feed document a hub POSTs to a subscription's
//! callback. Each item's preferred content is sanitized and stored as an
//! entry for every project whose links carry the subscription.

use chrono::Utc;
use feed_rs::model::{Entry as FeedEntry, Link as FeedLink};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use tracing::{debug, info, warn};

use super::repository::{EntryRepository, SubscriptionRepository};
use super::sanitize::{sanitize_html, strip_tags};
use super::types::{ContentRepresentation, EntryContent, NewEntry, Notification, NotifiedEntry};
use crate::db::Database;
use crate::project::LinkRepository;
use crate::{BetafarmError, Result};

/// Content types in order of preference.
const PREFERRED_TYPES: &[&str] = &["text/html", "application/xhtml+xml", "text/plain"];

/// Pick the content to store for an item.
///
/// HTML wins over XHTML, XHTML over plain text; otherwise the first
/// representation, or the single untyped value.
pub fn preferred_content(content: &EntryContent) -> Option<&str> {
    match content {
        EntryContent::Single(value) => Some(value.as_str()),
        EntryContent::Many(representations) => PREFERRED_TYPES
            .iter()
            .find_map(|wanted| {
                representations
                    .iter()
                    .find(|r| r.media_type.eq_ignore_ascii_case(wanted))
            })
            .or_else(|| representations.first())
            .map(|r| r.value.as_str()),
    }
}

impl Notification {
    /// Parse a hub notification body (RSS or Atom).
    pub fn parse(body: &[u8]) -> Result<Self> {
        let feed = feed_rs::parser::parse(body)
            .map_err(|e| BetafarmError::Validation(format!("unparseable notification: {}", e)))?;

        Ok(Notification {
            entries: feed.entries.into_iter().map(notified_entry).collect(),
        })
    }
}

fn notified_entry(entry: FeedEntry) -> NotifiedEntry {
    let title = entry
        .title
        .map(|t| strip_tags(&t.content).trim().to_string())
        .unwrap_or_default();
    let link = permalink(&entry.links).unwrap_or_default();
    let published = entry.published.or(entry.updated);

    let mut representations = Vec::new();
    if let Some(body) = entry.content.and_then(|c| {
        let media_type = c.content_type.essence().to_string();
        c.body.map(|body| ContentRepresentation::new(media_type, body))
    }) {
        representations.push(body);
    }

    let content = match (representations.is_empty(), entry.summary) {
        (true, Some(summary)) => EntryContent::Single(summary.content),
        (true, None) => EntryContent::Single(String::new()),
        (false, summary) => {
            if let Some(summary) = summary {
                representations.push(ContentRepresentation::new(
                    summary.content_type.essence().to_string(),
                    summary.content,
                ));
            }
            EntryContent::Many(representations)
        }
    };

    NotifiedEntry {
        guid: entry.id,
        title,
        link,
        published,
        content,
    }
}

fn permalink(links: &[FeedLink]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}

/// Check an `X-Hub-Signature` header against the body.
///
/// Without a secret every delivery is accepted; with one, the header must
/// carry a matching `sha1=` or `sha256=` HMAC.
pub fn signature_matches(secret: Option<&str>, header: Option<&str>, body: &[u8]) -> bool {
    let Some(secret) = secret else {
        return true;
    };
    let Some((algorithm, digest)) = header.and_then(|h| h.trim().split_once('=')) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };

    match algorithm.to_ascii_lowercase().as_str() {
        "sha1" => Hmac::<Sha1>::new_from_slice(secret.as_bytes())
            .map(|mut mac| {
                mac.update(body);
                mac.verify_slice(&expected).is_ok()
            })
            .unwrap_or(false),
        "sha256" => Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map(|mut mac| {
                mac.update(body);
                mac.verify_slice(&expected).is_ok()
            })
            .unwrap_or(false),
        _ => false,
    }
}

/// Turns notifications into entries.
#[derive(Clone)]
pub struct NotificationHandler {
    db: Database,
}

impl NotificationHandler {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store the entries of a notification for every project using the
    /// subscription.
    ///
    /// Unknown subscriptions are ignored. Items already stored for a project
    /// are skipped. Returns the number of entries created.
    pub async fn handle(&self, subscription_id: i64, notification: &Notification) -> Result<usize> {
        let Some(subscription) = SubscriptionRepository::new(self.db.pool())
            .get_by_id(subscription_id)
            .await?
        else {
            debug!(subscription_id, "Notification for unknown subscription ignored");
            return Ok(0);
        };

        let links = LinkRepository::new(self.db.pool())
            .list_by_subscription(subscription.id)
            .await?;
        let targets: Vec<_> = links
            .iter()
            .filter_map(|link| link.project_id.map(|project_id| (link.id, project_id)))
            .collect();
        if targets.is_empty() {
            warn!(subscription_id, topic = %subscription.topic, "No project uses this subscription");
            return Ok(0);
        }

        let entries = EntryRepository::new(self.db.pool());
        let mut created = 0;

        for item in &notification.entries {
            debug!(title = %item.title, link = %item.link, "Received notification of entry");
            let body = sanitize_html(preferred_content(&item.content).unwrap_or_default());
            let dedup_key = item.dedup_key();
            let published = item.published.unwrap_or_else(Utc::now);

            for (link_id, project_id) in &targets {
                let entry = NewEntry::new(
                    *project_id,
                    item.title.as_str(),
                    item.link.as_str(),
                    body.as_str(),
                    published,
                    dedup_key.as_str(),
                )
                .with_link(*link_id);

                match entries.create_with_activity(&entry).await? {
                    Some(stored) => {
                        created += 1;
                        debug!(entry_id = stored.id, project_id, "Entry created");
                    }
                    None => debug!(project_id, link = %item.link, "Entry already stored"),
                }
            }
        }

        info!(
            subscription_id,
            items = notification.entries.len(),
            created,
            "Notification handled"
        );
        Ok(created)
    }
}
