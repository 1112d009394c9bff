//! Project link and follow handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::web::dto::{
    ApiResponse, CreateLinkRequest, FollowRequest, FollowResponse, LinkResponse, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// POST /api/projects/:slug/links - Add a link to a project.
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    ValidatedJson(req): ValidatedJson<CreateLinkRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LinkResponse>>), ApiError> {
    let link = state.projects.create_link(&slug, req.into_new_link()).await?;
    tracing::info!(link_id = link.id, project = %slug, "Link created");

    Ok((StatusCode::CREATED, Json(ApiResponse::new(link.into()))))
}

/// DELETE /api/links/:id - Delete a link.
pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    Path(link_id): Path<i64>,
) -> Result<Json<ApiResponse<LinkResponse>>, ApiError> {
    let link = state.projects.delete_link(link_id).await?;
    tracing::info!(link_id, "Link deleted");

    Ok(Json(ApiResponse::new(link.into())))
}

/// POST /api/projects/:slug/follow
pub async fn follow_project(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    ValidatedJson(req): ValidatedJson<FollowRequest>,
) -> Result<Json<ApiResponse<FollowResponse>>, ApiError> {
    let changed = state.projects.follow(&slug, &req.username).await?;

    Ok(Json(ApiResponse::new(FollowResponse {
        project: slug,
        username: req.username,
        changed,
    })))
}

/// POST /api/projects/:slug/unfollow
pub async fn unfollow_project(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    ValidatedJson(req): ValidatedJson<FollowRequest>,
) -> Result<Json<ApiResponse<FollowResponse>>, ApiError> {
    let changed = state.projects.unfollow(&slug, &req.username).await?;

    Ok(Json(ApiResponse::new(FollowResponse {
        project: slug,
        username: req.username,
        changed,
    })))
}
