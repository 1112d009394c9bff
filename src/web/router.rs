//! Router configuration for the web API.

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{
    create_link, dashboard, delete_link, follow_project, notify_callback, project_activity,
    unfollow_project, verify_callback, AppState,
};

/// Create the main router: the JSON API under `/api` and the hub callback
/// under `/push`.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let project_routes = Router::new()
        .route("/:slug/links", post(create_link))
        .route("/:slug/follow", post(follow_project))
        .route("/:slug/unfollow", post(unfollow_project))
        .route("/:slug/activity", get(project_activity));

    let api_routes = Router::new()
        .nest("/projects", project_routes)
        .route("/links/:id", delete(delete_link))
        .route("/profiles/:username/dashboard", get(dashboard));

    let push_routes = Router::new().route(
        "/callback/:id",
        get(verify_callback).post(notify_callback),
    );

    Router::new()
        .nest("/api", api_routes)
        .nest("/push", push_routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
