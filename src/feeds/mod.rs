//! Feed subscription pipeline for Betafarm.
//!
//! This module discovers a page's feed and hub, keeps PubSubHubbub
//! subscriptions for project links, and turns hub notifications into
//! sanitized entries.

pub mod discovery;
pub mod fetcher;
pub mod hub;
pub mod import;
pub mod notification;
pub mod repository;
pub mod sanitize;
pub mod subscriber;
pub mod tasks;
pub mod types;
pub mod updater;

pub use discovery::{resolve_url, FeedDiscovery};
pub use fetcher::{validate_url, FetchedPage, HttpFetcher, PageFetcher};
pub use hub::{HttpHubClient, HubAck, HubClient, HubMode, HubRequest, HubSettings};
pub use import::{FeedImporter, ImportReport, ImportTarget};
pub use notification::{preferred_content, signature_matches, NotificationHandler};
pub use repository::{EntryRepository, SubscriptionRepository};
pub use sanitize::{sanitize_html, strip_tags, ALLOWED_ATTRIBUTES, ALLOWED_TAGS};
pub use subscriber::SubscriptionManager;
pub use tasks::{RetryPolicy, Task, TaskQueue, TaskRunner, TaskWorker};
pub use types::{
    ContentRepresentation, DiscoveredFeed, Entry, EntryContent, NewEntry, Notification,
    NotifiedEntry, Subscription, SubscriptionState, MAX_TITLE_LENGTH,
};
pub use updater::LeaseRenewer;
