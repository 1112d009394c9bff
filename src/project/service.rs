//! Project service for Betafarm.
//!
//! Link changes drive the push pipeline: creating a subscribing link enqueues
//! a subscribe task and deleting a link enqueues an unsubscribe task.

use tracing::warn;

use super::repository::{LinkRepository, ProfileRepository, ProjectRepository};
use super::types::{Link, NewLink, NewProject, Profile, Project, MAX_LINK_NAME_LENGTH};
use crate::db::Database;
use crate::feeds::{Task, TaskQueue};
use crate::{BetafarmError, Result};

/// Service for project, link and follow operations.
#[derive(Clone)]
pub struct ProjectService {
    db: Database,
    queue: TaskQueue,
}

impl ProjectService {
    pub fn new(db: Database, queue: TaskQueue) -> Self {
        Self { db, queue }
    }

    /// Create a project.
    pub async fn create_project(&self, project: &NewProject) -> Result<Project> {
        validate_slug(&project.slug)?;
        if project.name.trim().is_empty() {
            return Err(BetafarmError::Validation("project name is required".into()));
        }

        let repo = ProjectRepository::new(self.db.pool());
        if repo.get_by_slug(&project.slug).await?.is_some() {
            return Err(BetafarmError::Validation(format!(
                "project slug already taken: {}",
                project.slug
            )));
        }
        repo.create(project).await
    }

    /// Create a profile.
    pub async fn create_profile(&self, username: &str, name: Option<&str>) -> Result<Profile> {
        validate_slug(username)?;

        let repo = ProfileRepository::new(self.db.pool());
        if repo.get_by_username(username).await?.is_some() {
            return Err(BetafarmError::Validation(format!(
                "username already taken: {}",
                username
            )));
        }
        repo.create(username, name).await
    }

    /// Add a link to a project.
    ///
    /// When the link subscribes, a subscribe task is enqueued once the link
    /// is stored.
    pub async fn create_link(&self, project_slug: &str, link: NewLink) -> Result<Link> {
        let project = self.project_by_slug(project_slug).await?;
        validate_link(&link)?;

        let link = LinkRepository::new(self.db.pool())
            .create(&link.with_project(project.id))
            .await?;
        if link.subscribe && !self.queue.enqueue(Task::Subscribe { link_id: link.id }) {
            warn!(link_id = link.id, "Link stored without a subscribe task");
        }

        Ok(link)
    }

    /// Delete a link and enqueue its unsubscription.
    pub async fn delete_link(&self, link_id: i64) -> Result<Link> {
        let repo = LinkRepository::new(self.db.pool());
        let link = repo
            .get_by_id(link_id)
            .await?
            .ok_or_else(|| BetafarmError::NotFound(format!("link {}", link_id)))?;

        repo.delete(link.id).await?;
        if !self.queue.enqueue(Task::Unsubscribe { link: link.clone() }) {
            warn!(
                link_id = link.id,
                subscription_id = ?link.subscription_id,
                "Link deleted without an unsubscribe task"
            );
        }

        Ok(link)
    }

    /// Make a profile follow a project. Returns false if it already did.
    pub async fn follow(&self, project_slug: &str, username: &str) -> Result<bool> {
        let project = self.project_by_slug(project_slug).await?;
        let profile = self.profile_by_username(username).await?;

        ProjectRepository::new(self.db.pool())
            .add_follower(project.id, profile.id)
            .await
    }

    /// Stop a profile following a project. Returns false if it did not.
    pub async fn unfollow(&self, project_slug: &str, username: &str) -> Result<bool> {
        let project = self.project_by_slug(project_slug).await?;
        let profile = self.profile_by_username(username).await?;

        ProjectRepository::new(self.db.pool())
            .remove_follower(project.id, profile.id)
            .await
    }

    async fn project_by_slug(&self, slug: &str) -> Result<Project> {
        ProjectRepository::new(self.db.pool())
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| BetafarmError::NotFound(format!("project {}", slug)))
    }

    async fn profile_by_username(&self, username: &str) -> Result<Profile> {
        ProfileRepository::new(self.db.pool())
            .get_by_username(username)
            .await?
            .ok_or_else(|| BetafarmError::NotFound(format!("profile {}", username)))
    }
}

fn validate_slug(slug: &str) -> Result<()> {
    let valid = !slug.is_empty()
        && slug.len() <= MAX_LINK_NAME_LENGTH
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BetafarmError::Validation(format!("invalid identifier: {:?}", slug)))
    }
}

fn validate_link(link: &NewLink) -> Result<()> {
    let name = link.name.trim();
    if name.is_empty() {
        return Err(BetafarmError::Validation("link name is required".into()));
    }
    if name.chars().count() > MAX_LINK_NAME_LENGTH {
        return Err(BetafarmError::Validation(format!(
            "link name is too long (max {} characters)",
            MAX_LINK_NAME_LENGTH
        )));
    }

    match url::Url::parse(&link.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
        _ => Err(BetafarmError::Validation(format!(
            "link URL must be an absolute http(s) URL: {}",
            link.url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn setup() -> (ProjectService, UnboundedReceiver<Task>) {
        let db = Database::open_in_memory().await.unwrap();
        let (queue, receiver) = TaskQueue::new();
        let service = ProjectService::new(db, queue);
        service
            .create_project(&NewProject::new("Rust Labs", "rust-labs"))
            .await
            .unwrap();
        (service, receiver)
    }

    #[tokio::test]
    async fn test_create_subscribing_link_enqueues_subscribe() {
        let (service, mut receiver) = setup().await;

        let link = service
            .create_link(
                "rust-labs",
                NewLink::new("Blog", "http://blog.example/").blog().subscribed(),
            )
            .await
            .unwrap();
        assert!(link.project_id.is_some());

        match receiver.try_recv() {
            Ok(Task::Subscribe { link_id }) => assert_eq!(link_id, link.id),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_plain_link_enqueues_nothing() {
        let (service, mut receiver) = setup().await;

        service
            .create_link("rust-labs", NewLink::new("Wiki", "https://wiki.example/"))
            .await
            .unwrap();
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_create_link_validation() {
        let (service, _receiver) = setup().await;

        let too_long = NewLink::new("x".repeat(MAX_LINK_NAME_LENGTH + 1), "http://blog.example/");
        let bad_url = NewLink::new("Blog", "javascript:alert(1)");
        let no_name = NewLink::new("  ", "http://blog.example/");

        for link in [too_long, bad_url, no_name] {
            let err = service.create_link("rust-labs", link).await.unwrap_err();
            assert!(matches!(err, BetafarmError::Validation(_)));
        }

        let err = service
            .create_link("nope", NewLink::new("Blog", "http://blog.example/"))
            .await
            .unwrap_err();
        assert!(matches!(err, BetafarmError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_link_enqueues_unsubscribe() {
        let (service, mut receiver) = setup().await;
        let link = service
            .create_link("rust-labs", NewLink::new("Wiki", "https://wiki.example/"))
            .await
            .unwrap();

        let deleted = service.delete_link(link.id).await.unwrap();
        assert_eq!(deleted.id, link.id);
        match receiver.try_recv() {
            Ok(Task::Unsubscribe { link: queued }) => assert_eq!(queued, link),
            other => panic!("unexpected: {other:?}"),
        }

        assert!(matches!(
            service.delete_link(link.id).await,
            Err(BetafarmError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_links_change_without_worker() {
        let (service, mut receiver) = setup().await;
        receiver.close();

        let link = service
            .create_link(
                "rust-labs",
                NewLink::new("Blog", "http://blog.example/").subscribed(),
            )
            .await
            .unwrap();
        let deleted = service.delete_link(link.id).await.unwrap();
        assert_eq!(deleted.id, link.id);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_follow_and_unfollow() {
        let (service, _receiver) = setup().await;
        service.create_profile("thedude", Some("The Dude")).await.unwrap();

        assert!(service.follow("rust-labs", "thedude").await.unwrap());
        assert!(!service.follow("rust-labs", "thedude").await.unwrap());
        assert!(service.unfollow("rust-labs", "thedude").await.unwrap());
        assert!(!service.unfollow("rust-labs", "thedude").await.unwrap());

        assert!(matches!(
            service.follow("rust-labs", "walter").await,
            Err(BetafarmError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_project_and_profile() {
        let (service, _receiver) = setup().await;

        assert!(matches!(
            service.create_project(&NewProject::new("Again", "rust-labs")).await,
            Err(BetafarmError::Validation(_))
        ));
        assert!(matches!(
            service.create_project(&NewProject::new("Bad", "Not A Slug")).await,
            Err(BetafarmError::Validation(_))
        ));

        service.create_profile("thedude", None).await.unwrap();
        assert!(matches!(
            service.create_profile("thedude", None).await,
            Err(BetafarmError::Validation(_))
        ));
    }
}
