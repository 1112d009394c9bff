//! Project, profile and link repositories for Betafarm.

use chrono::Utc;

use super::types::{Link, NewLink, NewProject, Profile, Project};
use crate::db::{format_datetime, parse_datetime, DbPool};
use crate::{BetafarmError, Result};

/// Row type for projects.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ProjectRow {
    id: i64,
    name: String,
    slug: String,
    description: String,
    created_at: String,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Row type for profiles.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ProfileRow {
    id: i64,
    username: String,
    name: Option<String>,
    created_at: String,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: row.id,
            username: row.username,
            name: row.name,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Row type for links.
#[derive(Debug, Clone, sqlx::FromRow)]
struct LinkRow {
    id: i64,
    project_id: Option<i64>,
    name: String,
    url: String,
    blog: bool,
    subscribe: bool,
    featured: bool,
    subscription_id: Option<i64>,
    version: i64,
    created_at: String,
}

impl From<LinkRow> for Link {
    fn from(row: LinkRow) -> Self {
        Link {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            url: row.url,
            blog: row.blog,
            subscribe: row.subscribe,
            featured: row.featured,
            subscription_id: row.subscription_id,
            version: row.version,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

const LINK_COLUMNS: &str =
    "id, project_id, name, url, blog, subscribe, featured, subscription_id, version, created_at";

/// Repository for project operations.
pub struct ProjectRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ProjectRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new project.
    pub async fn create(&self, project: &NewProject) -> Result<Project> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO projects (name, slug, description, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&project.name)
        .bind(&project.slug)
        .bind(&project.description)
        .bind(format_datetime(&Utc::now()))
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| BetafarmError::NotFound("project".into()))
    }

    /// Get a project by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, slug, description, created_at FROM projects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Project::from))
    }

    /// Get a project by slug.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, slug, description, created_at FROM projects WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Project::from))
    }

    /// Make a profile follow a project. Returns false if it already did.
    pub async fn add_follower(&self, project_id: i64, profile_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO project_followers (project_id, profile_id) VALUES ($1, $2)",
        )
        .bind(project_id)
        .bind(profile_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stop a profile following a project. Returns false if it did not.
    pub async fn remove_follower(&self, project_id: i64, profile_id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM project_followers WHERE project_id = $1 AND profile_id = $2")
                .bind(project_id)
                .bind(profile_id)
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count a project's followers.
    pub async fn count_followers(&self, project_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM project_followers WHERE project_id = $1")
                .bind(project_id)
                .fetch_one(self.pool)
                .await?;

        Ok(count)
    }

    /// List the projects a profile follows, by name.
    pub async fn list_followed(&self, profile_id: i64) -> Result<Vec<Project>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT p.id, p.name, p.slug, p.description, p.created_at
            FROM projects p
            JOIN project_followers f ON f.project_id = p.id
            WHERE f.profile_id = $1
            ORDER BY p.name ASC
            "#,
        )
        .bind(profile_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Project::from).collect())
    }
}

/// Repository for profile operations.
pub struct ProfileRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ProfileRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new profile.
    pub async fn create(&self, username: &str, name: Option<&str>) -> Result<Profile> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO profiles (username, name, created_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(username)
        .bind(name)
        .bind(format_datetime(&Utc::now()))
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| BetafarmError::NotFound("profile".into()))
    }

    /// Get a profile by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, username, name, created_at FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Profile::from))
    }

    /// Get a profile by username.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, username, name, created_at FROM profiles WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Profile::from))
    }
}

/// Repository for link operations.
pub struct LinkRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> LinkRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new link.
    pub async fn create(&self, link: &NewLink) -> Result<Link> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO links (project_id, name, url, blog, subscribe, featured, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(link.project_id)
        .bind(&link.name)
        .bind(&link.url)
        .bind(link.blog)
        .bind(link.subscribe)
        .bind(link.featured)
        .bind(format_datetime(&Utc::now()))
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| BetafarmError::NotFound("link".into()))
    }

    /// Get a link by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Link>> {
        let query = format!("SELECT {LINK_COLUMNS} FROM links WHERE id = $1");
        let row = sqlx::query_as::<_, LinkRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Link::from))
    }

    /// List a project's links (ordered by creation).
    pub async fn list_by_project(&self, project_id: i64) -> Result<Vec<Link>> {
        let query = format!("SELECT {LINK_COLUMNS} FROM links WHERE project_id = $1 ORDER BY id ASC");
        let rows = sqlx::query_as::<_, LinkRow>(&query)
            .bind(project_id)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Link::from).collect())
    }

    /// List every link carrying a subscription.
    pub async fn list_by_subscription(&self, subscription_id: i64) -> Result<Vec<Link>> {
        let query =
            format!("SELECT {LINK_COLUMNS} FROM links WHERE subscription_id = $1 ORDER BY id ASC");
        let rows = sqlx::query_as::<_, LinkRow>(&query)
            .bind(subscription_id)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Link::from).collect())
    }

    /// Count links carrying a subscription.
    pub async fn count_by_subscription(&self, subscription_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM links WHERE subscription_id = $1")
            .bind(subscription_id)
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }

    /// Store a subscription reference if the link is still at `expected_version`.
    ///
    /// Returns false when the link was changed or deleted in the meantime.
    pub async fn set_subscription(
        &self,
        link_id: i64,
        subscription_id: i64,
        expected_version: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE links
            SET subscription_id = $1, version = version + 1
            WHERE id = $2 AND version = $3
            "#,
        )
        .bind(subscription_id)
        .bind(link_id)
        .bind(expected_version)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clear a link's subscription reference.
    pub async fn clear_subscription(&self, link_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE links
            SET subscription_id = NULL, version = version + 1
            WHERE id = $1 AND subscription_id IS NOT NULL
            "#,
        )
        .bind(link_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a link.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM links WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn setup_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    async fn create_test_project(db: &Database, slug: &str) -> Project {
        ProjectRepository::new(db.pool())
            .create(&NewProject::new("Rust Labs", slug).with_description("Systems things"))
            .await
            .unwrap()
    }

    async fn create_test_subscription(db: &Database) -> i64 {
        sqlx::query_scalar(
            r#"
            INSERT INTO subscriptions (topic, hub, verify_token, created_at, updated_at)
            VALUES ('http://blog.example/rss', 'http://hub.example/', 'token', 'now', 'now')
            RETURNING id
            "#,
        )
        .fetch_one(db.pool())
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_project() {
        let db = setup_db().await;
        let project = create_test_project(&db, "rust-labs").await;

        assert!(project.id > 0);
        assert_eq!(project.slug, "rust-labs");
        assert_eq!(project.description, "Systems things");

        let by_slug = ProjectRepository::new(db.pool())
            .get_by_slug("rust-labs")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_slug, project);
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let db = setup_db().await;
        create_test_project(&db, "rust-labs").await;

        let result = ProjectRepository::new(db.pool())
            .create(&NewProject::new("Other", "rust-labs"))
            .await;
        assert!(matches!(result, Err(BetafarmError::Database(_))));
    }

    #[tokio::test]
    async fn test_followers() {
        let db = setup_db().await;
        let project = create_test_project(&db, "rust-labs").await;
        let profile = ProfileRepository::new(db.pool())
            .create("thedude", Some("The Dude"))
            .await
            .unwrap();
        let repo = ProjectRepository::new(db.pool());

        assert!(repo.add_follower(project.id, profile.id).await.unwrap());
        assert!(!repo.add_follower(project.id, profile.id).await.unwrap());
        assert_eq!(repo.count_followers(project.id).await.unwrap(), 1);
        assert_eq!(repo.list_followed(profile.id).await.unwrap(), vec![project.clone()]);

        assert!(repo.remove_follower(project.id, profile.id).await.unwrap());
        assert!(!repo.remove_follower(project.id, profile.id).await.unwrap());
        assert_eq!(repo.count_followers(project.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_profile_by_username() {
        let db = setup_db().await;
        let repo = ProfileRepository::new(db.pool());
        let created = repo.create("jlebowski", None).await.unwrap();

        let found = repo.get_by_username("jlebowski").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert!(found.name.is_none());
        assert!(repo.get_by_username("walter").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_link() {
        let db = setup_db().await;
        let project = create_test_project(&db, "rust-labs").await;
        let repo = LinkRepository::new(db.pool());

        let link = repo
            .create(&NewLink::new("Blog", "http://blog.example/").with_project(project.id).blog().subscribed())
            .await
            .unwrap();

        assert_eq!(link.project_id, Some(project.id));
        assert!(link.blog);
        assert!(link.subscribe);
        assert!(link.subscription_id.is_none());
        assert_eq!(link.version, 0);
        assert_eq!(repo.list_by_project(project.id).await.unwrap(), vec![link]);
    }

    #[tokio::test]
    async fn test_set_subscription_checks_version() {
        let db = setup_db().await;
        let project = create_test_project(&db, "rust-labs").await;
        let sub_id = create_test_subscription(&db).await;
        let repo = LinkRepository::new(db.pool());
        let link = repo
            .create(&NewLink::new("Blog", "http://blog.example/").with_project(project.id))
            .await
            .unwrap();

        assert!(repo.set_subscription(link.id, sub_id, 0).await.unwrap());
        // Stale version
        assert!(!repo.set_subscription(link.id, sub_id, 0).await.unwrap());

        let stored = repo.get_by_id(link.id).await.unwrap().unwrap();
        assert_eq!(stored.subscription_id, Some(sub_id));
        assert_eq!(stored.version, 1);
        assert_eq!(repo.count_by_subscription(sub_id).await.unwrap(), 1);
        assert_eq!(repo.list_by_subscription(sub_id).await.unwrap().len(), 1);

        assert!(repo.clear_subscription(link.id).await.unwrap());
        assert!(!repo.clear_subscription(link.id).await.unwrap());
        let cleared = repo.get_by_id(link.id).await.unwrap().unwrap();
        assert!(cleared.subscription_id.is_none());
        assert_eq!(cleared.version, 2);
    }

    #[tokio::test]
    async fn test_delete_link() {
        let db = setup_db().await;
        let repo = LinkRepository::new(db.pool());
        let link = repo.create(&NewLink::new("Wiki", "https://wiki.example/")).await.unwrap();

        assert!(repo.delete(link.id).await.unwrap());
        assert!(repo.get_by_id(link.id).await.unwrap().is_none());
        assert!(!repo.delete(link.id).await.unwrap());
    }
}
