//! Feed pipeline types for Betafarm.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Maximum stored title length, in characters.
pub const MAX_TITLE_LENGTH: usize = 100;

/// Atom MIME type advertised by alternate links.
pub const ATOM_MIME_TYPE: &str = "application/atom+xml";

/// RSS MIME type advertised by alternate links.
pub const RSS_MIME_TYPE: &str = "application/rss+xml";

/// Lifecycle of a hub subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Requested, waiting for the hub to verify intent.
    Pending,
    /// Verified by the hub; notifications are expected.
    Active,
    /// Unsubscribe requested, waiting for the hub to verify intent.
    Unsubscribing,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Pending => "pending",
            SubscriptionState::Active => "active",
            SubscriptionState::Unsubscribing => "unsubscribing",
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubscriptionState::Pending),
            "active" => Ok(SubscriptionState::Active),
            "unsubscribing" => Ok(SubscriptionState::Unsubscribing),
            other => Err(format!("unknown subscription state: {other}")),
        }
    }
}

/// A hub subscription for one (feed, hub) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Subscription ID; also the callback path segment.
    pub id: i64,
    /// Feed URL (the hub topic).
    pub topic: String,
    /// Hub URL.
    pub hub: String,
    /// Current state.
    pub state: SubscriptionState,
    /// Token the hub must echo when verifying intent.
    pub verify_token: String,
    /// HMAC secret for signed notifications.
    pub secret: Option<String>,
    /// When the hub lease runs out.
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of feed discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFeed {
    /// Resolved RSS/Atom feed URL.
    pub feed_url: String,
    /// Hub advertised by the feed, or the configured default.
    pub hub_url: String,
}

/// One ingested, sanitized feed item.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: i64,
    /// Project the entry was ingested for.
    pub project_id: i64,
    /// Link the entry arrived through, if it still exists.
    pub link_id: Option<i64>,
    pub title: String,
    /// Permalink of the upstream item.
    pub url: String,
    /// Sanitized HTML body.
    pub body: String,
    pub published_at: DateTime<Utc>,
    /// Idempotency key, unique per project.
    pub dedup_key: String,
    pub created_at: DateTime<Utc>,
}

/// New entry for creation.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub project_id: i64,
    pub link_id: Option<i64>,
    pub title: String,
    pub url: String,
    pub body: String,
    pub published_at: DateTime<Utc>,
    pub dedup_key: String,
}

impl NewEntry {
    /// Create a new entry; `body` must already be sanitized.
    pub fn new(
        project_id: i64,
        title: impl Into<String>,
        url: impl Into<String>,
        body: impl Into<String>,
        published_at: DateTime<Utc>,
        dedup_key: impl Into<String>,
    ) -> Self {
        Self {
            project_id,
            link_id: None,
            title: truncate_title(&title.into()),
            url: url.into(),
            body: body.into(),
            published_at,
            dedup_key: dedup_key.into(),
        }
    }

    /// Set the originating link.
    pub fn with_link(mut self, link_id: i64) -> Self {
        self.link_id = Some(link_id);
        self
    }
}

/// One representation of an item's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRepresentation {
    /// MIME type, e.g. `text/html`.
    pub media_type: String,
    pub value: String,
}

impl ContentRepresentation {
    pub fn new(media_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            value: value.into(),
        }
    }
}

/// Content of a notified item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryContent {
    /// A single untyped value.
    Single(String),
    /// Typed representations in document order.
    Many(Vec<ContentRepresentation>),
}

/// One item of a hub notification or an imported feed.
#[derive(Debug, Clone, PartialEq)]
pub struct NotifiedEntry {
    /// Upstream identifier (RSS guid / Atom id).
    pub guid: String,
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub content: EntryContent,
}

impl NotifiedEntry {
    /// Idempotency key for this item.
    ///
    /// Built from title, link and publication time; the guid stands in for a
    /// missing publication time.
    pub fn dedup_key(&self) -> String {
        let stamp = match self.published {
            Some(published) => published.to_rfc3339(),
            None => self.guid.clone(),
        };

        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.link.as_bytes());
        hasher.update(b"\n");
        hasher.update(stamp.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A batch of entries pushed by a hub.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notification {
    pub entries: Vec<NotifiedEntry>,
}

fn truncate_title(title: &str) -> String {
    let title = title.trim();
    if title.chars().count() <= MAX_TITLE_LENGTH {
        title.to_string()
    } else {
        title.chars().take(MAX_TITLE_LENGTH).collect()
    }
}
