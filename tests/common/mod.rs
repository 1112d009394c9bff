//! Shared helpers for integration tests.
//!
//! Provides an in-memory database, a scripted page fetcher and a hub that
//! records every request instead of talking HTTP.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use betafarm::config::ActivityConfig;
use betafarm::error::HubError;
use betafarm::feeds::{
    FetchedPage, HubAck, HubClient, HubMode, HubRequest, HubSettings, PageFetcher,
    SubscriptionManager, Task, TaskQueue,
};
use betafarm::web::AppState;
use betafarm::{BetafarmError, Database, Result};
use tokio::sync::mpsc::UnboundedReceiver;

pub const HUB: &str = "http://hub.example/";
pub const DEFAULT_HUB: &str = "http://default-hub.example/";
pub const PUBLIC_URL: &str = "https://betafarm.example";

/// A blog page advertising its RSS feed.
pub const BLOG_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>Blog</title>
    <link rel="alternate" type="application/rss+xml" title="RSS" href="/rss">
  </head>
  <body><p>Hello</p></body>
</html>"#;

/// The blog's feed, naming its hub.
pub const BLOG_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Blog</title>
    <link>http://blog.example/</link>
    <description>A blog</description>
    <atom:link rel="hub" href="http://hub.example/"/>
  </channel>
</rss>"#;

/// Build an Atom notification with one entry per `(id, title, html)`.
pub fn atom_notification(items: &[(&str, &str, &str)]) -> String {
    let entries: String = items
        .iter()
        .map(|(id, title, html)| {
            format!(
                r#"<entry>
    <id>urn:blog:{id}</id>
    <title>{title}</title>
    <link rel="alternate" href="http://blog.example/{id}"/>
    <updated>2011-09-0{id}T08:00:00Z</updated>
    <published>2011-09-0{id}T08:00:00Z</published>
    <content type="html">{html}</content>
  </entry>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>urn:blog</id>
  <title>Blog</title>
  <updated>2011-09-09T08:00:00Z</updated>
  {entries}
</feed>"#
    )
}

/// Serves canned pages by URL; anything else is a 404.
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: HashMap<String, (Option<String>, String)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    /// The blog at `http://blog.example/` and its feed.
    pub fn blog() -> Self {
        Self::default()
            .with_page("http://blog.example/", Some("text/html"), BLOG_PAGE)
            .with_page("http://blog.example/rss", Some("application/rss+xml"), BLOG_FEED)
    }

    pub fn with_page(mut self, url: &str, content_type: Option<&str>, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            (content_type.map(str::to_string), body.to_string()),
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some((content_type, body)) => {
                Ok(FetchedPage::new(url, content_type.as_deref(), body.as_str()))
            }
            None => Err(BetafarmError::Fetch(format!("HTTP error 404 for {url}"))),
        }
    }
}

/// Hub that records requests and answers with a fixed acknowledgement.
pub struct RecordingHub {
    ack: HubAck,
    requests: Mutex<Vec<HubRequest>>,
}

impl RecordingHub {
    pub fn new(ack: HubAck) -> Arc<Self> {
        Arc::new(Self {
            ack,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HubRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, mode: HubMode) -> usize {
        self.requests().iter().filter(|r| r.mode == mode).count()
    }
}

#[async_trait]
impl HubClient for RecordingHub {
    async fn send(&self, request: &HubRequest) -> std::result::Result<HubAck, HubError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.ack)
    }
}

pub fn hub_settings() -> HubSettings {
    HubSettings {
        default_hub: DEFAULT_HUB.to_string(),
        username: String::new(),
        password: String::new(),
        lease_seconds: 86400,
        public_url: PUBLIC_URL.to_string(),
    }
}

/// Everything a test needs to drive the pipeline by hand.
pub struct Harness {
    pub db: Database,
    pub fetcher: Arc<ScriptedFetcher>,
    pub hub: Arc<RecordingHub>,
    pub manager: Arc<SubscriptionManager>,
    pub queue: TaskQueue,
    pub receiver: UnboundedReceiver<Task>,
}

impl Harness {
    pub async fn new(fetcher: ScriptedFetcher, ack: HubAck) -> Self {
        let db = Database::open_in_memory()
            .await
            .expect("Failed to create test database");
        let fetcher = Arc::new(fetcher);
        let hub = RecordingHub::new(ack);
        let manager = Arc::new(SubscriptionManager::new(
            db.clone(),
            fetcher.clone(),
            hub.clone(),
            hub_settings(),
        ));
        let (queue, receiver) = TaskQueue::new();

        Self {
            db,
            fetcher,
            hub,
            manager,
            queue,
            receiver,
        }
    }

    /// Application state sharing this harness's database and queue.
    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState::new(
            self.db.clone(),
            self.queue.clone(),
            Arc::clone(&self.manager),
            &ActivityConfig::default(),
        ))
    }

    /// Pop every queued task.
    pub fn drain(&mut self) -> Vec<Task> {
        let mut tasks = Vec::new();
        while let Ok(task) = self.receiver.try_recv() {
            tasks.push(task);
        }
        tasks
    }
}
