//! Activity timeline types for Betafarm.

use chrono::{DateTime, Utc};

use crate::feeds::Entry;

/// What an activity points at.
///
/// Stored as a `(source_kind, source_id)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivitySource {
    /// An ingested feed entry.
    Entry(i64),
}

impl ActivitySource {
    /// Stored kind tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ActivitySource::Entry(_) => "entry",
        }
    }

    /// ID of the referenced row.
    pub fn id(&self) -> i64 {
        match self {
            ActivitySource::Entry(id) => *id,
        }
    }

    /// Rebuild a source from its stored columns.
    pub fn from_parts(kind: &str, id: i64) -> Option<Self> {
        match kind {
            "entry" => Some(ActivitySource::Entry(id)),
            _ => None,
        }
    }
}

/// A timeline pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub id: i64,
    pub source: ActivitySource,
    /// When the activity was recorded.
    pub published_on: DateTime<Utc>,
}

/// An activity joined with the entry and project it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityItem {
    pub activity_id: i64,
    pub published_on: DateTime<Utc>,
    pub entry: Entry,
    pub project_name: String,
    pub project_slug: String,
}

/// One page of a timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityPage {
    /// Items, newest first.
    pub items: Vec<ActivityItem>,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    /// Total number of activities in the timeline.
    pub total: i64,
    /// Whether a later page exists.
    pub has_more: bool,
}

impl ActivityPage {
    pub fn new(items: Vec<ActivityItem>, page: u32, page_size: u32, total: i64) -> Self {
        let window = i64::from(page) * i64::from(page_size);
        Self {
            items,
            page,
            page_size,
            total,
            has_more: total > window,
        }
    }
}
