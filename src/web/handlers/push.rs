//! PubSubHubbub callback handlers.
//!
//! Hubs call `GET /push/callback/:id` to verify a (un)subscription and
//! `POST /push/callback/:id` to deliver new content.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use std::sync::Arc;

use crate::feeds::{signature_matches, Notification, SubscriptionRepository, Task};
use crate::web::dto::HubVerification;
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Header carrying the HMAC signature of a notification body.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// GET /push/callback/:id - Answer a hub's intent verification.
pub async fn verify_callback(
    State(state): State<Arc<AppState>>,
    Path(subscription_id): Path<i64>,
    Query(query): Query<HubVerification>,
) -> Result<String, ApiError> {
    let confirmed = state
        .subscriptions
        .verify_intent(
            subscription_id,
            &query.mode,
            &query.topic,
            query.verify_token.as_deref(),
            query.lease_seconds,
        )
        .await?;

    if confirmed {
        Ok(query.challenge)
    } else {
        Err(ApiError::not_found("Unknown or mismatched subscription"))
    }
}

/// POST /push/callback/:id - Accept a hub notification.
///
/// The body is parsed here and stored in the background.
pub async fn notify_callback(
    State(state): State<Arc<AppState>>,
    Path(subscription_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let subscription = SubscriptionRepository::new(state.db.pool())
        .get_by_id(subscription_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Subscription not found"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if !signature_matches(subscription.secret.as_deref(), signature, &body) {
        tracing::warn!(subscription_id, "Notification signature mismatch, ignored");
        return Ok(StatusCode::OK);
    }

    let notification = Notification::parse(&body).map_err(|e| {
        tracing::warn!(subscription_id, "Rejected notification: {}", e);
        ApiError::bad_request("Unparseable notification body")
    })?;

    tracing::info!(
        subscription_id,
        entries = notification.entries.len(),
        "Notification received"
    );
    let queued = state.queue.enqueue(Task::Notify {
        subscription_id,
        notification,
    });
    if !queued {
        // A non-2xx answer makes the hub deliver again later.
        return Err(ApiError::internal("Notification could not be queued"));
    }

    Ok(StatusCode::OK)
}
