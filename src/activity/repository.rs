//! Activity repository for Betafarm.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::types::{Activity, ActivityItem, ActivitySource};
use crate::db::{format_datetime, parse_datetime, DbPool};
use crate::feeds::Entry;
use crate::Result;

/// Row type for activities.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ActivityRow {
    id: i64,
    source_kind: String,
    source_id: i64,
    published_on: String,
}

impl ActivityRow {
    fn into_activity(self) -> Option<Activity> {
        Some(Activity {
            id: self.id,
            source: ActivitySource::from_parts(&self.source_kind, self.source_id)?,
            published_on: parse_datetime(&self.published_on).unwrap_or_else(Utc::now),
        })
    }
}

/// Row type for timeline items.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ActivityItemRow {
    activity_id: i64,
    published_on: String,
    entry_id: i64,
    project_id: i64,
    link_id: Option<i64>,
    title: String,
    url: String,
    body: String,
    published_at: String,
    dedup_key: String,
    created_at: String,
    project_name: String,
    project_slug: String,
}

impl From<ActivityItemRow> for ActivityItem {
    fn from(row: ActivityItemRow) -> Self {
        ActivityItem {
            activity_id: row.activity_id,
            published_on: parse_datetime(&row.published_on).unwrap_or_else(Utc::now),
            entry: Entry {
                id: row.entry_id,
                project_id: row.project_id,
                link_id: row.link_id,
                title: row.title,
                url: row.url,
                body: row.body,
                published_at: parse_datetime(&row.published_at).unwrap_or_else(Utc::now),
                dedup_key: row.dedup_key,
                created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
            },
            project_name: row.project_name,
            project_slug: row.project_slug,
        }
    }
}

const ITEM_SELECT: &str = r#"
    SELECT a.id AS activity_id, a.published_on,
           e.id AS entry_id, e.project_id, e.link_id, e.title, e.url, e.body,
           e.published_at, e.dedup_key, e.created_at,
           p.name AS project_name, p.slug AS project_slug
    FROM activities a
    JOIN entries e ON a.source_kind = 'entry' AND a.source_id = e.id
    JOIN projects p ON p.id = e.project_id
"#;

/// Record an activity on an open connection or transaction.
///
/// Returns the new activity ID, or `None` if the source already has one.
pub async fn insert_activity(
    conn: &mut SqliteConnection,
    source: ActivitySource,
    published_on: DateTime<Utc>,
) -> Result<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT OR IGNORE INTO activities (source_kind, source_id, published_on)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(source.kind())
    .bind(source.id())
    .bind(format_datetime(&published_on))
    .fetch_optional(conn)
    .await?;

    Ok(id)
}

/// Repository for activity operations.
pub struct ActivityRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ActivityRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Get the activity recorded for a source.
    pub async fn get_by_source(&self, source: ActivitySource) -> Result<Option<Activity>> {
        let row = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, source_kind, source_id, published_on
            FROM activities
            WHERE source_kind = $1 AND source_id = $2
            "#,
        )
        .bind(source.kind())
        .bind(source.id())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.and_then(ActivityRow::into_activity))
    }

    /// List a project's timeline, newest first.
    pub async fn list_for_project(
        &self,
        project_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ActivityItem>> {
        let query = format!(
            "{ITEM_SELECT} WHERE e.project_id = $1 \
             ORDER BY a.published_on DESC, a.id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, ActivityItemRow>(&query)
            .bind(project_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(ActivityItem::from).collect())
    }

    /// Count a project's timeline.
    pub async fn count_for_project(&self, project_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM activities a
            JOIN entries e ON a.source_kind = 'entry' AND a.source_id = e.id
            WHERE e.project_id = $1
            "#,
        )
        .bind(project_id)
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }

    /// List the timeline of every project a profile follows, newest first.
    pub async fn list_for_profile(
        &self,
        profile_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ActivityItem>> {
        let query = format!(
            "{ITEM_SELECT} WHERE e.project_id IN \
             (SELECT project_id FROM project_followers WHERE profile_id = $1) \
             ORDER BY a.published_on DESC, a.id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, ActivityItemRow>(&query)
            .bind(profile_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(ActivityItem::from).collect())
    }

    /// Count the timeline of every project a profile follows.
    pub async fn count_for_profile(&self, profile_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM activities a
            JOIN entries e ON a.source_kind = 'entry' AND a.source_id = e.id
            WHERE e.project_id IN
                (SELECT project_id FROM project_followers WHERE profile_id = $1)
            "#,
        )
        .bind(profile_id)
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::{EntryRepository, NewEntry};
    use crate::project::{NewProject, ProfileRepository, ProjectRepository};
    use crate::Database;

    async fn setup_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    async fn create_entries(db: &Database, project_id: i64, count: usize) {
        let repo = EntryRepository::new(db.pool());
        for i in 0..count {
            let entry = NewEntry::new(
                project_id,
                format!("Post {i}"),
                format!("http://blog.example/{project_id}/{i}"),
                "<p>body</p>",
                Utc::now(),
                format!("key-{project_id}-{i}"),
            );
            repo.create_with_activity(&entry).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_insert_activity_once_per_source() {
        let db = setup_db().await;
        let repo = ActivityRepository::new(db.pool());
        let mut conn = db.pool().acquire().await.unwrap();

        let first = insert_activity(&mut *conn, ActivitySource::Entry(99), Utc::now())
            .await
            .unwrap();
        assert!(first.is_some());
        assert!(insert_activity(&mut *conn, ActivitySource::Entry(99), Utc::now())
            .await
            .unwrap()
            .is_none());
        drop(conn);

        let stored = repo.get_by_source(ActivitySource::Entry(99)).await.unwrap().unwrap();
        assert_eq!(stored.id, first.unwrap());
        assert_eq!(stored.source, ActivitySource::Entry(99));
    }

    #[tokio::test]
    async fn test_list_for_project_newest_first() {
        let db = setup_db().await;
        let project = ProjectRepository::new(db.pool())
            .create(&NewProject::new("Rust Labs", "rust-labs"))
            .await
            .unwrap();
        create_entries(&db, project.id, 3).await;

        let repo = ActivityRepository::new(db.pool());
        let items = repo.list_for_project(project.id, 10, 0).await.unwrap();
        let titles: Vec<_> = items.iter().map(|i| i.entry.title.as_str()).collect();
        assert_eq!(titles, vec!["Post 2", "Post 1", "Post 0"]);
        assert_eq!(items[0].project_slug, "rust-labs");
        assert_eq!(repo.count_for_project(project.id).await.unwrap(), 3);

        let second_page = repo.list_for_project(project.id, 2, 2).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].entry.title, "Post 0");
    }

    #[tokio::test]
    async fn test_list_for_profile_follows_only() {
        let db = setup_db().await;
        let projects = ProjectRepository::new(db.pool());
        let followed = projects.create(&NewProject::new("A", "a")).await.unwrap();
        let other = projects.create(&NewProject::new("B", "b")).await.unwrap();
        let profile = ProfileRepository::new(db.pool())
            .create("thedude", None)
            .await
            .unwrap();
        projects.add_follower(followed.id, profile.id).await.unwrap();

        create_entries(&db, followed.id, 2).await;
        create_entries(&db, other.id, 4).await;

        let repo = ActivityRepository::new(db.pool());
        let items = repo.list_for_profile(profile.id, 20, 0).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.entry.project_id == followed.id));
        assert_eq!(repo.count_for_profile(profile.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_activity_removed_with_entry() {
        let db = setup_db().await;
        let project = ProjectRepository::new(db.pool())
            .create(&NewProject::new("Rust Labs", "rust-labs"))
            .await
            .unwrap();
        create_entries(&db, project.id, 1).await;

        let entries = EntryRepository::new(db.pool());
        let entry = entries.list_by_project(project.id).await.unwrap().remove(0);
        sqlx::query("DELETE FROM entries WHERE id = $1")
            .bind(entry.id)
            .execute(db.pool())
            .await
            .unwrap();

        let repo = ActivityRepository::new(db.pool());
        assert!(repo
            .get_by_source(ActivitySource::Entry(entry.id))
            .await
            .unwrap()
            .is_none());
        assert_eq!(repo.count_for_project(project.id).await.unwrap(), 0);
    }
}
