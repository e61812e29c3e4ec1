use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};
use crate::envelope::{empty, reply};
use crate::middleware::require_auth;
use crate::{account, channels};

/// 10 MB cap on request bodies, enough for avatar and cover images.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Every route, mounted under `/api/v1`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/users/register", post(auth::register))
        .route("/users/login", post(auth::login))
        .route("/users/refresh-token", post(auth::refresh_access_token));

    let protected_routes = Router::new()
        .route("/users/logout", post(auth::logout))
        .route("/users/change-password", post(account::change_current_password))
        .route("/users/current-user", get(account::get_current_user))
        .route("/users/update-account", patch(account::update_account_details))
        .route("/users/avatar", patch(account::update_user_avatar))
        .route("/users/cover-image", patch(account::update_user_cover_image))
        .route("/users/c/{username}", get(channels::get_user_channel_profile))
        .route("/subscriptions/c/{channel_id}", post(channels::toggle_subscription))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest("/api/v1", public_routes.merge(protected_routes))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /healthcheck: liveness check (no auth).
async fn healthcheck() -> impl IntoResponse {
    reply(StatusCode::OK, empty(), "OK")
}
