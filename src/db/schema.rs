//! Database schema and migrations for Betafarm.
//!
//! Migrations are applied sequentially when the database is opened;
//! the schema_version table tracks which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Profiles, projects and follow relationships
    r#"
CREATE TABLE profiles (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT NOT NULL UNIQUE,
    name        TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE projects (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    slug        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL
);

CREATE TABLE project_followers (
    project_id  INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    profile_id  INTEGER NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    PRIMARY KEY (project_id, profile_id)
);

CREATE INDEX idx_project_followers_profile ON project_followers(profile_id);
"#,
    // v2: Hub subscriptions and project links
    r#"
CREATE TABLE subscriptions (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    topic             TEXT NOT NULL,
    hub               TEXT NOT NULL,
    state             TEXT NOT NULL DEFAULT 'pending',  -- 'pending', 'active', 'unsubscribing'
    verify_token      TEXT NOT NULL,
    secret            TEXT,
    lease_expires_at  TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    UNIQUE (topic, hub)
);

CREATE INDEX idx_subscriptions_state ON subscriptions(state);

CREATE TABLE links (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id       INTEGER REFERENCES projects(id) ON DELETE CASCADE,
    name             TEXT NOT NULL,
    url              TEXT NOT NULL,
    blog             INTEGER NOT NULL DEFAULT 0,
    subscribe        INTEGER NOT NULL DEFAULT 0,
    featured         INTEGER NOT NULL DEFAULT 0,
    subscription_id  INTEGER REFERENCES subscriptions(id) ON DELETE SET NULL,
    version          INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL
);

CREATE INDEX idx_links_project ON links(project_id);
CREATE INDEX idx_links_subscription ON links(subscription_id);
"#,
    // v3: Ingested entries and the activity timeline
    r#"
CREATE TABLE entries (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id    INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    link_id       INTEGER REFERENCES links(id) ON DELETE SET NULL,
    title         TEXT NOT NULL,
    url           TEXT NOT NULL,
    body          TEXT NOT NULL,
    published_at  TEXT NOT NULL,
    dedup_key     TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    UNIQUE (project_id, dedup_key)
);

CREATE INDEX idx_entries_project ON entries(project_id);

CREATE TABLE activities (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    source_kind   TEXT NOT NULL,  -- 'entry'
    source_id     INTEGER NOT NULL,
    published_on  TEXT NOT NULL,
    UNIQUE (source_kind, source_id)
);

CREATE INDEX idx_activities_published_on ON activities(published_on);

-- Activities follow their entry
CREATE TRIGGER trg_entries_delete_activity
AFTER DELETE ON entries
BEGIN
    DELETE FROM activities WHERE source_kind = 'entry' AND source_id = OLD.id;
END;
"#,
];
