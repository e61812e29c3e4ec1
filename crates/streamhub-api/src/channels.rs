use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use streamhub_types::api::SubscriptionToggleResponse;
use streamhub_types::models::ChannelProfile;

use crate::auth::{AppState, with_db};
use crate::envelope::reply;
use crate::error::{ApiError, ApiResult};
use crate::middleware::CurrentUser;

/// GET /users/c/{username}
pub async fn get_user_channel_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(viewer)): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let username = username.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::bad_request("Username is missing"));
    }

    let viewer_id = viewer.id.to_string();
    let profile: ChannelProfile = with_db(&state, move |db| {
        db.get_channel_profile(&username, Some(&viewer_id))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Channel does not exist"))?
    .into();

    Ok(reply(StatusCode::OK, profile, "User channel fetched successfully"))
}

/// POST /subscriptions/c/{channel_id}: subscribe, or unsubscribe if
/// already subscribed.
pub async fn toggle_subscription(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(channel_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let channel_id: Uuid = channel_id
        .parse()
        .map_err(|_| ApiError::not_found("Channel does not exist"))?;

    if channel_id == user.id {
        return Err(ApiError::bad_request("Cannot subscribe to your own channel"));
    }

    let subscriber_id = user.id.to_string();
    let channel = channel_id.to_string();
    let subscribed = with_db(&state, move |db| {
        if db.get_user_by_id(&channel)?.is_none() {
            return Ok(None);
        }
        let subscription_id = Uuid::new_v4().to_string();
        db.toggle_subscription(&subscription_id, &subscriber_id, &channel)
            .map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Channel does not exist"))?;

    info!(
        "User {} {} channel {}",
        user.username,
        if subscribed { "subscribed to" } else { "unsubscribed from" },
        channel_id
    );

    let message = if subscribed {
        "Subscribed successfully"
    } else {
        "Unsubscribed successfully"
    };
    Ok(reply(StatusCode::OK, SubscriptionToggleResponse { subscribed }, message))
}
