//! Activity timeline handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::web::dto::{ActivityItemResponse, PageQuery, PaginatedResponse};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// GET /api/projects/:slug/activity - A project's timeline.
pub async fn project_activity(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedResponse<ActivityItemResponse>>, ApiError> {
    let page = state.activity.project_activity(&slug, query.page()).await?;
    Ok(Json(page.into()))
}

/// GET /api/profiles/:username/dashboard - Timeline of every followed project.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedResponse<ActivityItemResponse>>, ApiError> {
    let page = state.activity.dashboard(&username, query.page()).await?;
    Ok(Json(page.into()))
}
