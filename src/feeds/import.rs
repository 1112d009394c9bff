//! One-off feed import.
//!
//! Pulls a feed once and stores its entries for a project, bypassing the
//! hub. Entries go through the same sanitizer, dedup key and activity
//! broadcast as pushed ones.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use super::fetcher::PageFetcher;
use super::notification::preferred_content;
use super::repository::EntryRepository;
use super::sanitize::sanitize_html;
use super::types::{NewEntry, Notification};
use crate::db::Database;
use crate::error::DiscoveryError;
use crate::project::{LinkRepository, ProjectRepository};
use crate::{BetafarmError, Result};

/// Where imported entries go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// A link, and through it the link's project.
    Link(i64),
    /// A project by slug.
    Project(String),
}

impl ImportTarget {
    /// Numeric targets are link IDs, falling back to a project slug when
    /// no such link exists; anything else is a project slug.
    pub fn parse(target: &str) -> Self {
        match target.trim().parse::<i64>() {
            Ok(id) => ImportTarget::Link(id),
            Err(_) => ImportTarget::Project(target.trim().to_string()),
        }
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub project_id: i64,
    pub link_id: Option<i64>,
    /// Items considered after applying the limit.
    pub considered: usize,
    /// Entries actually created.
    pub created: usize,
}

/// Imports feeds into projects.
pub struct FeedImporter {
    db: Database,
    fetcher: Arc<dyn PageFetcher>,
}

impl FeedImporter {
    pub fn new(db: Database, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { db, fetcher }
    }

    /// Import up to `limit` items of `feed_url` into `target`.
    pub async fn import(
        &self,
        feed_url: &str,
        target: &ImportTarget,
        limit: Option<usize>,
    ) -> Result<ImportReport> {
        let (project_id, link_id) = self.resolve_target(target).await?;

        let document = self.fetcher.fetch(feed_url).await?;
        let notification = Notification::parse(&document.body)
            .map_err(|_| DiscoveryError::InvalidFeed(feed_url.to_string()))?;

        let entries = EntryRepository::new(self.db.pool());
        let limit = limit.unwrap_or(usize::MAX);
        let mut report = ImportReport {
            project_id,
            link_id,
            considered: 0,
            created: 0,
        };

        for item in notification.entries.iter().take(limit) {
            report.considered += 1;
            let body = sanitize_html(preferred_content(&item.content).unwrap_or_default());
            let mut entry = NewEntry::new(
                project_id,
                item.title.as_str(),
                item.link.as_str(),
                body,
                item.published.unwrap_or_else(Utc::now),
                item.dedup_key(),
            );
            if let Some(link_id) = link_id {
                entry = entry.with_link(link_id);
            }

            match entries.create_with_activity(&entry).await? {
                Some(stored) => {
                    report.created += 1;
                    debug!(entry_id = stored.id, title = %stored.title, "Imported entry");
                }
                None => debug!(link = %item.link, "Entry already imported"),
            }
        }

        info!(
            feed = %feed_url,
            project_id,
            considered = report.considered,
            created = report.created,
            "Feed imported"
        );
        Ok(report)
    }

    async fn resolve_target(&self, target: &ImportTarget) -> Result<(i64, Option<i64>)> {
        match target {
            ImportTarget::Link(id) => {
                let Some(link) = LinkRepository::new(self.db.pool()).get_by_id(*id).await? else {
                    let slug = id.to_string();
                    return match ProjectRepository::new(self.db.pool()).get_by_slug(&slug).await? {
                        Some(project) => Ok((project.id, None)),
                        None => Err(BetafarmError::NotFound(format!("link with id {}", id))),
                    };
                };
                let project_id = link.project_id.ok_or_else(|| {
                    BetafarmError::Validation(format!("link {} has no project", id))
                })?;
                Ok((project_id, Some(link.id)))
            }
            ImportTarget::Project(slug) => {
                let project = ProjectRepository::new(self.db.pool())
                    .get_by_slug(slug)
                    .await?
                    .ok_or_else(|| BetafarmError::NotFound(format!("project {}", slug)))?;
                Ok((project.id, None))
            }
        }
    }
}
