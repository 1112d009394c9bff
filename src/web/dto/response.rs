//! Response DTOs for the web API.

use serde::Serialize;

use crate::activity::{ActivityItem, ActivityPage};
use crate::project::Link;

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Paginated response wrapper.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

/// Pagination metadata.
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total number of items.
    pub total: i64,
    /// Whether a later page exists.
    pub has_more: bool,
}

/// A project link.
#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub id: i64,
    pub project_id: Option<i64>,
    pub name: String,
    pub url: String,
    pub blog: bool,
    pub subscribe: bool,
    pub featured: bool,
    pub subscription_id: Option<i64>,
    pub created_at: String,
}

impl From<Link> for LinkResponse {
    fn from(link: Link) -> Self {
        Self {
            id: link.id,
            project_id: link.project_id,
            name: link.name,
            url: link.url,
            blog: link.blog,
            subscribe: link.subscribe,
            featured: link.featured,
            subscription_id: link.subscription_id,
            created_at: link.created_at.to_rfc3339(),
        }
    }
}

/// One timeline item.
#[derive(Debug, Serialize)]
pub struct ActivityItemResponse {
    pub id: i64,
    pub published_on: String,
    pub project: String,
    pub project_slug: String,
    pub entry_id: i64,
    pub title: String,
    pub url: String,
    /// Sanitized HTML.
    pub body: String,
    pub published_at: String,
}

impl From<ActivityItem> for ActivityItemResponse {
    fn from(item: ActivityItem) -> Self {
        Self {
            id: item.activity_id,
            published_on: item.published_on.to_rfc3339(),
            project: item.project_name,
            project_slug: item.project_slug,
            entry_id: item.entry.id,
            title: item.entry.title,
            url: item.entry.url,
            body: item.entry.body,
            published_at: item.entry.published_at.to_rfc3339(),
        }
    }
}

impl From<ActivityPage> for PaginatedResponse<ActivityItemResponse> {
    fn from(page: ActivityPage) -> Self {
        Self {
            meta: PaginationMeta {
                page: page.page,
                per_page: page.page_size,
                total: page.total,
                has_more: page.has_more,
            },
            data: page.items.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result of a follow or unfollow request.
#[derive(Debug, Serialize)]
pub struct FollowResponse {
    pub project: String,
    pub username: String,
    /// Whether the request changed anything.
    pub changed: bool,
}
