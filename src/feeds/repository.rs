//! Subscription and entry repositories for Betafarm.

use chrono::{DateTime, Utc};

use super::types::{Entry, NewEntry, Subscription, SubscriptionState};
use crate::activity::{insert_activity, ActivitySource};
use crate::db::{format_datetime, parse_datetime, DbPool};
use crate::{BetafarmError, Result};

/// Row type for subscriptions.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    topic: String,
    hub: String,
    state: String,
    verify_token: String,
    secret: Option<String>,
    lease_expires_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = BetafarmError;

    fn try_from(row: SubscriptionRow) -> Result<Self> {
        let state = row
            .state
            .parse::<SubscriptionState>()
            .map_err(BetafarmError::Database)?;

        Ok(Subscription {
            id: row.id,
            topic: row.topic,
            hub: row.hub,
            state,
            verify_token: row.verify_token,
            secret: row.secret,
            lease_expires_at: row.lease_expires_at.as_deref().and_then(parse_datetime),
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_datetime(&row.updated_at).unwrap_or_else(Utc::now),
        })
    }
}

const SUBSCRIPTION_COLUMNS: &str =
    "id, topic, hub, state, verify_token, secret, lease_expires_at, created_at, updated_at";

/// Repository for hub subscriptions.
pub struct SubscriptionRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SubscriptionRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a pending subscription.
    pub async fn create(
        &self,
        topic: &str,
        hub: &str,
        verify_token: &str,
        secret: Option<&str>,
    ) -> Result<Subscription> {
        let now = format_datetime(&Utc::now());
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO subscriptions (topic, hub, state, verify_token, secret, created_at, updated_at)
            VALUES ($1, $2, 'pending', $3, $4, $5, $5)
            RETURNING id
            "#,
        )
        .bind(topic)
        .bind(hub)
        .bind(verify_token)
        .bind(secret)
        .bind(&now)
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| BetafarmError::NotFound("subscription".into()))
    }

    /// Create a pending subscription for (topic, hub), or return the row
    /// another task inserted first.
    pub async fn create_or_get(
        &self,
        topic: &str,
        hub: &str,
        verify_token: &str,
        secret: Option<&str>,
    ) -> Result<Subscription> {
        let now = format_datetime(&Utc::now());
        sqlx::query(
            r#"
            INSERT INTO subscriptions (topic, hub, state, verify_token, secret, created_at, updated_at)
            VALUES ($1, $2, 'pending', $3, $4, $5, $5)
            ON CONFLICT (topic, hub) DO NOTHING
            "#,
        )
        .bind(topic)
        .bind(hub)
        .bind(verify_token)
        .bind(secret)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get_by_topic_hub(topic, hub)
            .await?
            .ok_or_else(|| BetafarmError::NotFound(format!("subscription for {}", topic)))
    }

    /// Get a subscription by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Subscription>> {
        let query = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1");
        let row = sqlx::query_as::<_, SubscriptionRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.map(Subscription::try_from).transpose()
    }

    /// Get the subscription for a (topic, hub) pair.
    pub async fn get_by_topic_hub(&self, topic: &str, hub: &str) -> Result<Option<Subscription>> {
        let query =
            format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE topic = $1 AND hub = $2");
        let row = sqlx::query_as::<_, SubscriptionRow>(&query)
            .bind(topic)
            .bind(hub)
            .fetch_optional(self.pool)
            .await?;

        row.map(Subscription::try_from).transpose()
    }

    /// Move a subscription to `state`.
    pub async fn set_state(&self, id: i64, state: SubscriptionState) -> Result<bool> {
        let result =
            sqlx::query("UPDATE subscriptions SET state = $1, updated_at = $2 WHERE id = $3")
                .bind(state.as_str())
                .bind(format_datetime(&Utc::now()))
                .bind(id)
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a subscription active with a new lease.
    pub async fn activate(&self, id: i64, lease_expires_at: Option<DateTime<Utc>>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET state = 'active', lease_expires_at = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(lease_expires_at.map(|at| format_datetime(&at)))
        .bind(format_datetime(&Utc::now()))
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace the verify token, returning a pending row to use.
    pub async fn reset_pending(&self, id: i64, verify_token: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET state = 'pending', verify_token = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(verify_token)
        .bind(format_datetime(&Utc::now()))
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List active subscriptions whose lease ends before `before`.
    pub async fn list_expiring(&self, before: DateTime<Utc>) -> Result<Vec<Subscription>> {
        let query = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
             WHERE state = 'active' AND lease_expires_at IS NOT NULL AND lease_expires_at <= $1 \
             ORDER BY lease_expires_at ASC"
        );
        let rows = sqlx::query_as::<_, SubscriptionRow>(&query)
            .bind(format_datetime(&before))
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    /// Delete a subscription.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Row type for entries.
#[derive(Debug, Clone, sqlx::FromRow)]
struct EntryRow {
    id: i64,
    project_id: i64,
    link_id: Option<i64>,
    title: String,
    url: String,
    body: String,
    published_at: String,
    dedup_key: String,
    created_at: String,
}

impl From<EntryRow> for Entry {
    fn from(row: EntryRow) -> Self {
        Entry {
            id: row.id,
            project_id: row.project_id,
            link_id: row.link_id,
            title: row.title,
            url: row.url,
            body: row.body,
            published_at: parse_datetime(&row.published_at).unwrap_or_else(Utc::now),
            dedup_key: row.dedup_key,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

const ENTRY_COLUMNS: &str =
    "id, project_id, link_id, title, url, body, published_at, dedup_key, created_at";

/// Repository for ingested entries.
pub struct EntryRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> EntryRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Store an entry and its activity in one transaction.
    ///
    /// Returns `None` when the project already holds an entry with the same
    /// dedup key; nothing is written in that case.
    pub async fn create_with_activity(&self, entry: &NewEntry) -> Result<Option<Entry>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT OR IGNORE INTO entries
                (project_id, link_id, title, url, body, published_at, dedup_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(entry.project_id)
        .bind(entry.link_id)
        .bind(&entry.title)
        .bind(&entry.url)
        .bind(&entry.body)
        .bind(format_datetime(&entry.published_at))
        .bind(&entry.dedup_key)
        .bind(format_datetime(&now))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            tx.rollback().await?;
            return Ok(None);
        };

        insert_activity(&mut *tx, ActivitySource::Entry(id), now).await?;
        tx.commit().await?;

        self.get_by_id(id).await
    }

    /// Get an entry by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Entry>> {
        let query = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = $1");
        let row = sqlx::query_as::<_, EntryRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Entry::from))
    }

    /// List a project's entries, oldest first.
    pub async fn list_by_project(&self, project_id: i64) -> Result<Vec<Entry>> {
        let query =
            format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE project_id = $1 ORDER BY id ASC");
        let rows = sqlx::query_as::<_, EntryRow>(&query)
            .bind(project_id)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Entry::from).collect())
    }

    /// Count a project's entries.
    pub async fn count_by_project(&self, project_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }
}
