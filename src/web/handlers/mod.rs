//! API handlers.

pub mod activity;
pub mod project;
pub mod push;

pub use activity::*;
pub use project::*;
pub use push::*;

use std::sync::Arc;

use crate::activity::ActivityService;
use crate::config::ActivityConfig;
use crate::db::Database;
use crate::feeds::{SubscriptionManager, TaskQueue};
use crate::project::ProjectService;

/// Shared state of every handler.
pub struct AppState {
    pub db: Database,
    /// Background task queue.
    pub queue: TaskQueue,
    pub subscriptions: Arc<SubscriptionManager>,
    pub projects: ProjectService,
    pub activity: ActivityService,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        db: Database,
        queue: TaskQueue,
        subscriptions: Arc<SubscriptionManager>,
        activity: &ActivityConfig,
    ) -> Self {
        Self {
            projects: ProjectService::new(db.clone(), queue.clone()),
            activity: ActivityService::new(db.clone(), activity),
            db,
            queue,
            subscriptions,
        }
    }
}
