//! Activity timeline queries.

use super::repository::ActivityRepository;
use super::types::ActivityPage;
use crate::config::ActivityConfig;
use crate::db::Database;
use crate::project::{ProfileRepository, ProjectRepository};
use crate::{BetafarmError, Result};

/// Paginated project and dashboard timelines.
#[derive(Clone)]
pub struct ActivityService {
    db: Database,
    project_page_size: u32,
    dashboard_page_size: u32,
}

impl ActivityService {
    pub fn new(db: Database, config: &ActivityConfig) -> Self {
        Self {
            db,
            project_page_size: config.project_page_size.max(1),
            dashboard_page_size: config.dashboard_page_size.max(1),
        }
    }

    /// One page of a project's timeline. Pages start at 1.
    pub async fn project_activity(&self, slug: &str, page: u32) -> Result<ActivityPage> {
        let project = ProjectRepository::new(self.db.pool())
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| BetafarmError::NotFound(format!("project {}", slug)))?;

        let page = page.max(1);
        let (limit, offset) = window(page, self.project_page_size);
        let repo = ActivityRepository::new(self.db.pool());
        let total = repo.count_for_project(project.id).await?;
        let items = repo.list_for_project(project.id, limit, offset).await?;

        Ok(ActivityPage::new(items, page, self.project_page_size, total))
    }

    /// One page of a profile's dashboard: activity of every followed project.
    pub async fn dashboard(&self, username: &str, page: u32) -> Result<ActivityPage> {
        let profile = ProfileRepository::new(self.db.pool())
            .get_by_username(username)
            .await?
            .ok_or_else(|| BetafarmError::NotFound(format!("profile {}", username)))?;

        let page = page.max(1);
        let (limit, offset) = window(page, self.dashboard_page_size);
        let repo = ActivityRepository::new(self.db.pool());
        let total = repo.count_for_profile(profile.id).await?;
        let items = repo.list_for_profile(profile.id, limit, offset).await?;

        Ok(ActivityPage::new(items, page, self.dashboard_page_size, total))
    }
}

fn window(page: u32, page_size: u32) -> (i64, i64) {
    let limit = i64::from(page_size);
    (limit, i64::from(page - 1) * limit)
}
