use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::{
    WithRejection,
    cookie::{Cookie, CookieJar},
};
use bytes::Bytes;
use tracing::{error, info, warn};
use uuid::Uuid;

use streamhub_db::{Database, NewUser};
use streamhub_media::MediaUploader;
use streamhub_types::api::{LoginRequest, LoginResponse, RefreshTokenRequest, TokenPairResponse};
use streamhub_types::models::User;

use crate::envelope::{empty, reply};
use crate::error::{ApiError, ApiResult};
use crate::middleware::CurrentUser;
use crate::tokens::{TokenPair, TokenService};
use crate::uploads::{MultipartForm, non_blank};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

const TOKEN_FAILURE: &str = "Something went wrong while generating refresh and access token";

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenService,
    pub media: Arc<dyn MediaUploader>,
    /// Where multipart files are staged before upload.
    pub upload_dir: PathBuf,
    /// Accepted email domain, compared case-insensitively.
    pub email_domain: String,
}

/// Run blocking store work (SQLite, Argon2) off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal("Internal server error")
        })?
        .map_err(ApiError::from)
}

pub(crate) fn email_matches_domain(email: &str, domain: &str) -> bool {
    match email.rsplit_once('@') {
        Some((local, host)) => {
            !local.is_empty()
                && !local.chars().any(char::is_whitespace)
                && host.eq_ignore_ascii_case(domain)
        }
        None => false,
    }
}

/// POST /users/register: multipart with avatar (required) and coverImage.
pub async fn register(
    State(state): State<AppState>,
    WithRejection(multipart, _): WithRejection<Multipart, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let mut form = MultipartForm::read(multipart, &state.upload_dir).await?;

    let (Some(full_name), Some(username), Some(email), Some(password)) = (
        form.text("fullName"),
        form.text("username"),
        form.text("email"),
        form.raw_text("password"),
    ) else {
        return Err(ApiError::bad_request("All fields are required"));
    };

    if !email_matches_domain(&email, &state.email_domain) {
        return Err(ApiError::bad_request("Invalid email address"));
    }

    let username = username.to_lowercase();

    let (u, e) = (username.clone(), email.clone());
    let existing =
        with_db(&state, move |db| db.find_users_by_username_or_email(Some(&u), Some(&e))).await?;
    if existing.iter().any(|row| row.username == username) {
        return Err(ApiError::conflict("Username already exists"));
    }
    if !existing.is_empty() {
        return Err(ApiError::conflict("Email already exists"));
    }

    let avatar_file = form
        .take_file("avatar")
        .ok_or_else(|| ApiError::bad_request("Avatar file is required"))?;
    let cover_file = form.take_file("coverImage");

    let avatar = state.media.upload(avatar_file.path()).await.map_err(|e| {
        warn!("Avatar upload failed for {}: {:#}", username, e);
        ApiError::bad_request("Avatar file is required")
    })?;
    drop(avatar_file);

    let cover_image = match cover_file {
        Some(file) => match state.media.upload(file.path()).await {
            Ok(media) => Some(media.url),
            Err(e) => {
                warn!("Cover image upload failed for {}: {:#}", username, e);
                None
            }
        },
        None => None,
    };

    let new_user = NewUser {
        id: Uuid::new_v4().to_string(),
        username,
        email,
        full_name,
        password,
        avatar: avatar.url,
        cover_image,
    };

    let created = with_db(&state, move |db| {
        db.create_user(&new_user)?;
        db.get_user_by_id(&new_user.id)
    })
    .await?
    .ok_or_else(|| ApiError::internal("Something went wrong while registering the user"))?
    .into_user()?;

    info!("User {} registered", created.username);
    Ok(reply(StatusCode::CREATED, created, "User registered successfully"))
}

/// POST /users/login: username or email plus password.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let username = non_blank(req.username.as_deref()).map(|u| u.to_lowercase());
    let email = non_blank(req.email.as_deref());

    if username.is_none() && email.is_none() {
        return Err(ApiError::bad_request("Username or email is required"));
    }
    if req.password.trim().is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }

    let password = req.password;
    let (row, password_ok) = with_db(&state, move |db| {
        let row = db
            .find_users_by_username_or_email(username.as_deref(), email.as_deref())?
            .into_iter()
            .next();
        Ok(row.map(|row| {
            let ok = row.is_password_correct(&password);
            (row, ok)
        }))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    if !password_ok {
        warn!("Failed login attempt for {}", row.username);
        return Err(ApiError::unauthorized("Invalid user credentials"));
    }

    let user = row.into_user()?;
    let pair = start_session(&state, &user).await?;

    info!("User {} logged in", user.username);
    let jar = set_session_cookies(jar, &pair);
    Ok((
        jar,
        reply(
            StatusCode::OK,
            LoginResponse {
                user,
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

/// POST /users/logout: revoke the stored refresh token and drop cookies.
pub async fn logout(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    jar: CookieJar,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id.to_string();
    with_db(&state, move |db| db.set_refresh_token(&user_id, None)).await?;

    info!("User {} logged out", user.username);
    Ok((clear_session_cookies(jar), reply(StatusCode::OK, empty(), "User logged out")))
}

/// POST /users/refresh-token: rotate the session. The token comes from the
/// `refreshToken` cookie or the JSON body.
pub async fn refresh_access_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshTokenRequest>(&body)
            .unwrap_or_default()
            .refresh_token
    };

    let incoming = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| non_blank(from_body.as_deref()))
        .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let claims = state.tokens.verify_refresh(&incoming).map_err(|e| {
        warn!("Refresh token rejected: {}", e);
        ApiError::unauthorized("Invalid refresh token")
    })?;

    let user_id = claims.sub.to_string();
    let row = with_db(&state, move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    if row.refresh_token.as_deref() != Some(incoming.as_str()) {
        warn!("Superseded refresh token presented for {}", row.username);
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    let user = row.into_user()?;
    let pair = state.tokens.issue_pair(&user).map_err(|e| {
        error!("Token minting failed: {:#}", e);
        ApiError::internal(TOKEN_FAILURE)
    })?;

    let (id, next) = (user.id.to_string(), pair.refresh_token.clone());
    let rotated = with_db(&state, move |db| db.rotate_refresh_token(&id, &incoming, &next)).await?;
    if !rotated {
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    let jar = set_session_cookies(jar, &pair);
    Ok((
        jar,
        reply(
            StatusCode::OK,
            TokenPairResponse {
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            },
            "Access token refreshed",
        ),
    ))
}

/// Mint a fresh pair and make its refresh token the only valid one.
async fn start_session(state: &AppState, user: &User) -> ApiResult<TokenPair> {
    let pair = state.tokens.issue_pair(user).map_err(|e| {
        error!("Token minting failed: {:#}", e);
        ApiError::internal(TOKEN_FAILURE)
    })?;

    let (id, refresh) = (user.id.to_string(), pair.refresh_token.clone());
    let stored = with_db(state, move |db| db.set_refresh_token(&id, Some(&refresh))).await?;
    if !stored {
        return Err(ApiError::internal(TOKEN_FAILURE));
    }
    Ok(pair)
}

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .build()
}

fn set_session_cookies(jar: CookieJar, pair: &TokenPair) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, pair.access_token.clone()))
        .add(session_cookie(REFRESH_COOKIE, pair.refresh_token.clone()))
}

/// Emit removal cookies even when the request authenticated by header and
/// carried no cookies of its own.
fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    let removal = |name| {
        let mut cookie = session_cookie(name, String::new());
        cookie.make_removal();
        cookie
    };
    jar.add(removal(ACCESS_COOKIE)).add(removal(REFRESH_COOKIE))
}
