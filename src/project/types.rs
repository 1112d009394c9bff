//! Project, profile and link types for Betafarm.

use chrono::{DateTime, Utc};

/// Maximum length of a link name.
pub const MAX_LINK_NAME_LENGTH: usize = 100;

/// A project published on Betafarm.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    /// Project ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// URL slug (unique).
    pub slug: String,
    /// Short description.
    pub description: String,
    /// When the project was created.
    pub created_at: DateTime<Utc>,
}

/// New project for creation.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub slug: String,
    pub description: String,
}

impl NewProject {
    /// Create a new project with an empty description.
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            description: String::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A user profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Profile ID.
    pub id: i64,
    /// Username (unique).
    pub username: String,
    /// Display name, if the user has set one.
    pub name: Option<String>,
    /// When the profile was created.
    pub created_at: DateTime<Utc>,
}

/// A named external URL attached to a project.
///
/// When `subscribe` is set, the link's feed is followed through a hub and
/// `subscription_id` points at the hub subscription once it is established.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Link ID.
    pub id: i64,
    /// Owning project, if any.
    pub project_id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Target URL (a page or a feed).
    pub url: String,
    /// Whether the link is the project's blog.
    pub blog: bool,
    /// Whether the link's feed should be subscribed to.
    pub subscribe: bool,
    /// Whether the link is featured on the project page.
    pub featured: bool,
    /// Hub subscription backing this link.
    pub subscription_id: Option<i64>,
    /// Bumped on every change of `subscription_id`.
    pub version: i64,
    /// When the link was created.
    pub created_at: DateTime<Utc>,
}

impl Link {
    /// Whether the link wants a subscription but does not have one yet.
    pub fn needs_subscription(&self) -> bool {
        self.subscribe && self.subscription_id.is_none()
    }
}

/// New link for creation.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub project_id: Option<i64>,
    pub name: String,
    pub url: String,
    pub blog: bool,
    pub subscribe: bool,
    pub featured: bool,
}

impl NewLink {
    /// Create a new plain link.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            project_id: None,
            name: name.into(),
            url: url.into(),
            blog: false,
            subscribe: false,
            featured: false,
        }
    }

    /// Attach the link to a project.
    pub fn with_project(mut self, project_id: i64) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Mark the link as the project's blog.
    pub fn blog(mut self) -> Self {
        self.blog = true;
        self
    }

    /// Subscribe to the link's feed.
    pub fn subscribed(mut self) -> Self {
        self.subscribe = true;
        self
    }

    /// Feature the link.
    pub fn featured(mut self) -> Self {
        self.featured = true;
        self
    }
}
