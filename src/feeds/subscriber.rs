//! Hub subscription manager.
//!
//! Establishes and tears down PubSubHubbub subscriptions for links. Work on
//! one link is serialized through a per-link lock, and the link's
//! subscription reference is only written when the link's version is the one
//! read under that lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::discovery::FeedDiscovery;
use super::fetcher::PageFetcher;
use super::hub::{HubAck, HubClient, HubMode, HubRequest, HubSettings};
use super::repository::SubscriptionRepository;
use super::types::{Subscription, SubscriptionState};
use crate::db::Database;
use crate::project::{Link, LinkRepository};
use crate::Result;

/// Manages hub subscriptions for links.
pub struct SubscriptionManager {
    db: Database,
    discovery: FeedDiscovery,
    hub: Arc<dyn HubClient>,
    settings: HubSettings,
    link_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SubscriptionManager {
    pub fn new(
        db: Database,
        fetcher: Arc<dyn PageFetcher>,
        hub: Arc<dyn HubClient>,
        settings: HubSettings,
    ) -> Self {
        let discovery = FeedDiscovery::new(fetcher, settings.default_hub.clone());
        Self {
            db,
            discovery,
            hub,
            settings,
            link_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_link(&self, link_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.link_locks.lock().await;
            locks.entry(link_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Subscribe a link to its feed's hub.
    ///
    /// Returns the subscription now referenced by the link, or `None` when
    /// there was nothing to do (link gone, not subscribing, or already
    /// subscribed) or the link changed while the hub was being contacted.
    pub async fn subscribe(&self, link_id: i64) -> Result<Option<Subscription>> {
        let _guard = self.lock_link(link_id).await;
        let links = LinkRepository::new(self.db.pool());

        let Some(link) = links.get_by_id(link_id).await? else {
            debug!(link_id, "Link no longer exists, skipping subscribe");
            return Ok(None);
        };
        if !link.needs_subscription() {
            debug!(link_id, "Link does not need a subscription");
            return Ok(None);
        }

        let discovered = self.discovery.discover(&link.url).await?;
        let subscriptions = SubscriptionRepository::new(self.db.pool());

        let subscription = match subscriptions
            .get_by_topic_hub(&discovered.feed_url, &discovered.hub_url)
            .await?
        {
            Some(existing) if existing.state == SubscriptionState::Active => {
                debug!(
                    subscription_id = existing.id,
                    topic = %existing.topic,
                    "Reusing active subscription"
                );
                existing
            }
            Some(mut existing) => {
                if existing.state == SubscriptionState::Unsubscribing {
                    existing.verify_token = new_token();
                    subscriptions
                        .reset_pending(existing.id, &existing.verify_token)
                        .await?;
                    existing.state = SubscriptionState::Pending;
                }
                self.request_subscribe(&existing).await?;
                existing
            }
            None => {
                let secret = new_token();
                let created = subscriptions
                    .create_or_get(
                        &discovered.feed_url,
                        &discovered.hub_url,
                        &new_token(),
                        Some(&secret),
                    )
                    .await?;
                // Another link may have subscribed the same feed meanwhile.
                if created.state != SubscriptionState::Active {
                    self.request_subscribe(&created).await?;
                }
                created
            }
        };

        if !links
            .set_subscription(link.id, subscription.id, link.version)
            .await?
        {
            warn!(
                link_id,
                subscription_id = subscription.id,
                "Link changed while subscribing, releasing subscription"
            );
            self.release(subscription.id).await?;
            return Ok(None);
        }

        info!(
            link_id,
            subscription_id = subscription.id,
            topic = %subscription.topic,
            hub = %subscription.hub,
            "Link subscribed"
        );
        subscriptions.get_by_id(subscription.id).await
    }

    /// Unsubscribe a link, typically one that was just deleted.
    ///
    /// A link without a subscription is a no-op. The hub is only contacted
    /// when no other link still uses the subscription. Returns whether the
    /// hub was asked to unsubscribe.
    pub async fn unsubscribe(&self, link: &Link) -> Result<bool> {
        let _guard = self.lock_link(link.id).await;

        let Some(subscription_id) = link.subscription_id else {
            warn!(link_id = link.id, url = %link.url, "Link has no subscription, nothing to unsubscribe");
            return Ok(false);
        };

        LinkRepository::new(self.db.pool())
            .clear_subscription(link.id)
            .await?;
        self.release(subscription_id).await
    }

    /// Re-send the subscribe request of an active subscription.
    pub async fn renew(&self, subscription_id: i64) -> Result<bool> {
        let subscriptions = SubscriptionRepository::new(self.db.pool());
        let Some(subscription) = subscriptions.get_by_id(subscription_id).await? else {
            debug!(subscription_id, "Subscription gone, skipping renewal");
            return Ok(false);
        };
        if subscription.state != SubscriptionState::Active {
            debug!(subscription_id, state = %subscription.state, "Subscription not active, skipping renewal");
            return Ok(false);
        }

        self.request_subscribe(&subscription).await?;
        info!(subscription_id, topic = %subscription.topic, "Subscription renewed");
        Ok(true)
    }

    /// Answer a hub's intent verification.
    ///
    /// Returns whether the challenge should be echoed back.
    pub async fn verify_intent(
        &self,
        subscription_id: i64,
        mode: &str,
        topic: &str,
        verify_token: Option<&str>,
        lease_seconds: Option<u64>,
    ) -> Result<bool> {
        let subscriptions = SubscriptionRepository::new(self.db.pool());
        let Some(subscription) = subscriptions.get_by_id(subscription_id).await? else {
            debug!(subscription_id, "Verification for unknown subscription");
            return Ok(false);
        };

        let Some(mode) = HubMode::parse(mode) else {
            warn!(subscription_id, mode, "Hub sent unexpected mode");
            return Ok(false);
        };
        if topic != subscription.topic {
            warn!(subscription_id, topic, "Verification topic mismatch");
            return Ok(false);
        }
        if verify_token != Some(subscription.verify_token.as_str()) {
            warn!(subscription_id, "Verification token mismatch");
            return Ok(false);
        }

        match (mode, subscription.state) {
            (HubMode::Subscribe, SubscriptionState::Pending | SubscriptionState::Active) => {
                let lease = lease_seconds.unwrap_or(self.settings.lease_seconds);
                subscriptions
                    .activate(subscription_id, Some(lease_expiry(lease)))
                    .await?;
                info!(subscription_id, lease, "Hub verified subscription");
                Ok(true)
            }
            (HubMode::Unsubscribe, SubscriptionState::Unsubscribing) => {
                subscriptions.delete(subscription_id).await?;
                info!(subscription_id, "Hub verified unsubscription");
                Ok(true)
            }
            (mode, state) => {
                warn!(subscription_id, %mode, %state, "Verification does not match subscription state");
                Ok(false)
            }
        }
    }

    // Unsubscribe at the hub once no link references the subscription.
    async fn release(&self, subscription_id: i64) -> Result<bool> {
        let remaining = LinkRepository::new(self.db.pool())
            .count_by_subscription(subscription_id)
            .await?;
        if remaining > 0 {
            debug!(subscription_id, remaining, "Subscription still in use");
            return Ok(false);
        }

        let subscriptions = SubscriptionRepository::new(self.db.pool());
        let Some(subscription) = subscriptions.get_by_id(subscription_id).await? else {
            warn!(subscription_id, "Subscription already gone");
            return Ok(false);
        };

        subscriptions
            .set_state(subscription_id, SubscriptionState::Unsubscribing)
            .await?;
        let request = self.build_request(HubMode::Unsubscribe, &subscription);
        if self.hub.send(&request).await? == HubAck::Verified {
            subscriptions.delete(subscription_id).await?;
        }

        info!(subscription_id, topic = %subscription.topic, hub = %subscription.hub, "Unsubscribed from hub");
        Ok(true)
    }

    async fn request_subscribe(&self, subscription: &Subscription) -> Result<()> {
        let request = self.build_request(HubMode::Subscribe, subscription);
        if self.hub.send(&request).await? == HubAck::Verified {
            SubscriptionRepository::new(self.db.pool())
                .activate(subscription.id, Some(lease_expiry(self.settings.lease_seconds)))
                .await?;
        }
        Ok(())
    }

    fn build_request(&self, mode: HubMode, subscription: &Subscription) -> HubRequest {
        let lease_seconds = match mode {
            HubMode::Subscribe if self.settings.lease_seconds > 0 => Some(self.settings.lease_seconds),
            _ => None,
        };

        HubRequest {
            mode,
            hub: subscription.hub.clone(),
            topic: subscription.topic.clone(),
            callback: self.settings.callback_url(subscription.id),
            verify_token: subscription.verify_token.clone(),
            secret: subscription.secret.clone(),
            lease_seconds,
            credentials: self.settings.credentials_for(&subscription.hub),
        }
    }
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Longest lease honoured, one year.
const MAX_LEASE_SECS: i64 = 365 * 86400;

fn lease_expiry(lease_seconds: u64) -> chrono::DateTime<Utc> {
    let seconds = i64::try_from(lease_seconds)
        .unwrap_or(MAX_LEASE_SECS)
        .min(MAX_LEASE_SECS);
    Utc::now() + Duration::seconds(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HubError;
    use crate::feeds::fetcher::FetchedPage;
    use crate::project::{NewLink, NewProject, ProjectRepository};
    use crate::BetafarmError;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    const PAGE: &str =
        r#"<html><head><link rel="alternate" type="application/rss+xml" href="/rss"></head></html>"#;
    const FEED: &str = r#"<?xml version="1.0"?>
        <rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom"><channel>
          <title>Blog</title><link>http://blog.example/</link><description>d</description>
          <atom:link rel="hub" href="http://hub.example/"/>
        </channel></rss>"#;

    struct BlogFetcher;

    #[async_trait]
    impl PageFetcher for BlogFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage> {
            match url {
                "http://blog.example/" | "http://mirror.example/" => {
                    Ok(FetchedPage::new(url, Some("text/html"), PAGE))
                }
                "http://blog.example/rss" | "http://mirror.example/rss" => {
                    Ok(FetchedPage::new(url, Some("application/rss+xml"), FEED))
                }
                _ => Err(BetafarmError::Fetch(format!("HTTP error 404 for {url}"))),
            }
        }
    }

    struct FakeHub {
        ack: std::result::Result<HubAck, HubError>,
        requests: StdMutex<Vec<HubRequest>>,
    }

    impl FakeHub {
        fn new(ack: std::result::Result<HubAck, HubError>) -> Arc<Self> {
            Arc::new(Self {
                ack,
                requests: StdMutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<HubRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HubClient for FakeHub {
        async fn send(&self, request: &HubRequest) -> std::result::Result<HubAck, HubError> {
            self.requests.lock().unwrap().push(request.clone());
            self.ack.clone()
        }
    }

    fn settings() -> HubSettings {
        HubSettings {
            default_hub: "http://default-hub.example/".to_string(),
            username: String::new(),
            password: String::new(),
            lease_seconds: 3600,
            public_url: "https://betafarm.example".to_string(),
        }
    }

    async fn setup(ack: std::result::Result<HubAck, HubError>) -> (Database, Arc<FakeHub>, SubscriptionManager) {
        let db = Database::open_in_memory().await.unwrap();
        let hub = FakeHub::new(ack);
        let manager = SubscriptionManager::new(db.clone(), Arc::new(BlogFetcher), hub.clone(), settings());
        (db, hub, manager)
    }

    async fn create_link(db: &Database, slug: &str, url: &str) -> Link {
        let project = ProjectRepository::new(db.pool())
            .create(&NewProject::new(slug, slug))
            .await
            .unwrap();
        LinkRepository::new(db.pool())
            .create(&NewLink::new("Blog", url).with_project(project.id).blog().subscribed())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_verified() {
        let (db, hub, manager) = setup(Ok(HubAck::Verified)).await;
        let link = create_link(&db, "p", "http://blog.example/").await;

        let sub = manager.subscribe(link.id).await.unwrap().unwrap();
        assert_eq!(sub.hub, "http://hub.example/");
        assert_eq!(sub.topic, "http://blog.example/rss");
        assert_eq!(sub.state, SubscriptionState::Active);
        assert!(sub.lease_expires_at.is_some());

        let requests = hub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].mode, HubMode::Subscribe);
        assert_eq!(requests[0].topic, "http://blog.example/rss");
        assert_eq!(
            requests[0].callback,
            format!("https://betafarm.example/push/callback/{}", sub.id)
        );

        let stored = LinkRepository::new(db.pool()).get_by_id(link.id).await.unwrap().unwrap();
        assert_eq!(stored.subscription_id, Some(sub.id));

        // Already subscribed
        assert!(manager.subscribe(link.id).await.unwrap().is_none());
        assert_eq!(hub.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_accepted_stays_pending() {
        let (db, _hub, manager) = setup(Ok(HubAck::Accepted)).await;
        let link = create_link(&db, "p", "http://blog.example/").await;

        let sub = manager.subscribe(link.id).await.unwrap().unwrap();
        assert_eq!(sub.state, SubscriptionState::Pending);

        let verified = manager
            .verify_intent(sub.id, "subscribe", &sub.topic, Some(&sub.verify_token), Some(600))
            .await
            .unwrap();
        assert!(verified);
        let active = SubscriptionRepository::new(db.pool())
            .get_by_id(sub.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.state, SubscriptionState::Active);
    }

    #[tokio::test]
    async fn test_subscribe_reuses_active_subscription() {
        let (db, hub, manager) = setup(Ok(HubAck::Verified)).await;
        let first = create_link(&db, "a", "http://blog.example/").await;
        let second = create_link(&db, "b", "http://blog.example/").await;

        let a = manager.subscribe(first.id).await.unwrap().unwrap();
        let b = manager.subscribe(second.id).await.unwrap().unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(hub.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_hub_error_leaves_link_unsubscribed() {
        let rejected = HubError::Rejected {
            mode: "subscribe".to_string(),
            status: 500,
            body: "boom".to_string(),
        };
        let (db, _hub, manager) = setup(Err(rejected)).await;
        let link = create_link(&db, "p", "http://blog.example/").await;

        let err = manager.subscribe(link.id).await.unwrap_err();
        assert!(err.is_transient());

        let stored = LinkRepository::new(db.pool()).get_by_id(link.id).await.unwrap().unwrap();
        assert!(stored.subscription_id.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_missing_link_is_noop() {
        let (_db, hub, manager) = setup(Ok(HubAck::Verified)).await;
        assert!(manager.subscribe(404).await.unwrap().is_none());
        assert!(hub.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_without_subscription() {
        let (db, hub, manager) = setup(Ok(HubAck::Verified)).await;
        let link = create_link(&db, "p", "http://blog.example/").await;

        assert!(!manager.unsubscribe(&link).await.unwrap());
        assert!(hub.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_last_link() {
        let (db, hub, manager) = setup(Ok(HubAck::Verified)).await;
        let link = create_link(&db, "p", "http://blog.example/").await;
        let sub = manager.subscribe(link.id).await.unwrap().unwrap();

        let links = LinkRepository::new(db.pool());
        let link = links.get_by_id(link.id).await.unwrap().unwrap();
        links.delete(link.id).await.unwrap();

        assert!(manager.unsubscribe(&link).await.unwrap());
        let requests = hub.requests();
        assert_eq!(requests.last().unwrap().mode, HubMode::Unsubscribe);
        assert_eq!(requests.last().unwrap().topic, "http://blog.example/rss");
        assert!(SubscriptionRepository::new(db.pool())
            .get_by_id(sub.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_shared_subscription_keeps_hub() {
        let (db, hub, manager) = setup(Ok(HubAck::Verified)).await;
        let first = create_link(&db, "a", "http://blog.example/").await;
        let second = create_link(&db, "b", "http://blog.example/").await;
        manager.subscribe(first.id).await.unwrap();
        manager.subscribe(second.id).await.unwrap();

        let links = LinkRepository::new(db.pool());
        let first = links.get_by_id(first.id).await.unwrap().unwrap();
        links.delete(first.id).await.unwrap();

        assert!(!manager.unsubscribe(&first).await.unwrap());
        assert_eq!(hub.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_verify_intent_rejects_mismatches() {
        let (db, _hub, manager) = setup(Ok(HubAck::Accepted)).await;
        let link = create_link(&db, "p", "http://blog.example/").await;
        let sub = manager.subscribe(link.id).await.unwrap().unwrap();

        let wrong_topic = manager
            .verify_intent(sub.id, "subscribe", "http://evil.example/", None, None)
            .await
            .unwrap();
        let wrong_token = manager
            .verify_intent(sub.id, "subscribe", &sub.topic, Some("nope"), None)
            .await
            .unwrap();
        let wrong_mode = manager
            .verify_intent(sub.id, "unsubscribe", &sub.topic, None, None)
            .await
            .unwrap();
        let unknown = manager
            .verify_intent(999, "subscribe", &sub.topic, None, None)
            .await
            .unwrap();

        assert!(!wrong_topic && !wrong_token && !wrong_mode && !unknown);
    }

    #[tokio::test]
    async fn test_verify_intent_requires_token() {
        let (db, _hub, manager) = setup(Ok(HubAck::Accepted)).await;
        let link = create_link(&db, "p", "http://blog.example/").await;
        let sub = manager.subscribe(link.id).await.unwrap().unwrap();
        let subscriptions = SubscriptionRepository::new(db.pool());

        let accepted = manager
            .verify_intent(sub.id, "subscribe", &sub.topic, None, Some(999_999))
            .await
            .unwrap();
        assert!(!accepted);
        let pending = subscriptions.get_by_id(sub.id).await.unwrap().unwrap();
        assert_eq!(pending.state, SubscriptionState::Pending);

        subscriptions
            .set_state(sub.id, SubscriptionState::Unsubscribing)
            .await
            .unwrap();
        let accepted = manager
            .verify_intent(sub.id, "unsubscribe", &sub.topic, None, None)
            .await
            .unwrap();
        assert!(!accepted);
        assert!(subscriptions.get_by_id(sub.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_renew_active_only() {
        let (db, hub, manager) = setup(Ok(HubAck::Verified)).await;
        let link = create_link(&db, "p", "http://blog.example/").await;
        let sub = manager.subscribe(link.id).await.unwrap().unwrap();

        assert!(manager.renew(sub.id).await.unwrap());
        assert_eq!(hub.requests().len(), 2);
        assert!(!manager.renew(999).await.unwrap());
    }
}
