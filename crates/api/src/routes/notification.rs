use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use carebell_services::notifications::{FeedQuery, FeedState, feed::FeedApplier};
use chrono::Utc;
use tracing::debug;

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

/// Current feed of the caller, as one snapshot.
pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<FeedState>, ApiError> {
    Ok(Json(load_feed(&state, &auth.user_id).await?))
}

/// Marks one of the caller's notifications read.
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notification_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let feed = load_feed(&state, &auth.user_id).await?;
    if feed.get(&notification_id).is_none() {
        return Err(ApiError::NotFound(format!(
            "Notification {notification_id} not found"
        )));
    }

    state.notifications.mark_read(&notification_id).await?;
    debug!(user_id = %auth.user_id, %notification_id, "Notification marked read via REST");
    Ok(StatusCode::NO_CONTENT)
}

async fn load_feed(state: &AppState, user_id: &str) -> Result<FeedState, ApiError> {
    let settings = &state.settings.notifications;
    let snapshot = state
        .notifications
        .snapshot(FeedQuery::new(user_id, settings.feed_limit))
        .await?;

    let mut applier = FeedApplier::new(user_id, settings.feed_limit);
    let notifications = applier.apply(snapshot, Utc::now());
    Ok(FeedState::new(notifications, settings.badge_cap))
}
