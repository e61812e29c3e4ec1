use axum::{
    Extension, Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::{info, warn};

use streamhub_types::api::{ChangePasswordRequest, UpdateAccountRequest};

use crate::auth::{AppState, email_matches_domain, with_db};
use crate::envelope::{empty, reply};
use crate::error::{ApiError, ApiResult};
use crate::middleware::CurrentUser;
use crate::uploads::{MultipartForm, non_blank};

/// POST /users/change-password
pub async fn change_current_password(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    WithRejection(Json(req), _): WithRejection<Json<ChangePasswordRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    if req.old_password.trim().is_empty() || req.new_password.trim().is_empty() {
        return Err(ApiError::bad_request("All fields are required"));
    }

    let user_id = user.id.to_string();
    let outcome = with_db(&state, move |db| {
        let Some(row) = db.get_user_by_id(&user_id)? else {
            return Ok(None);
        };
        if !row.is_password_correct(&req.old_password) {
            return Ok(Some(false));
        }
        db.update_password(&user_id, &req.new_password)?;
        Ok(Some(true))
    })
    .await?;

    match outcome {
        None => Err(ApiError::unauthorized("Invalid access token")),
        Some(false) => Err(ApiError::bad_request("Invalid old password")),
        Some(true) => {
            info!("User {} changed password", user.username);
            Ok(reply(StatusCode::OK, empty(), "Password changed successfully"))
        }
    }
}

/// GET /users/current-user: echoes the identity attached by `require_auth`.
pub async fn get_current_user(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> impl IntoResponse {
    reply(StatusCode::OK, user, "Current user fetched successfully")
}

/// PATCH /users/update-account: full name and email change together.
pub async fn update_account_details(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateAccountRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let (Some(full_name), Some(email)) = (
        non_blank(Some(req.full_name.as_str())),
        non_blank(Some(req.email.as_str())),
    ) else {
        return Err(ApiError::bad_request("All fields are required"));
    };

    if !email_matches_domain(&email, &state.email_domain) {
        return Err(ApiError::bad_request("Invalid email address"));
    }

    let user_id = user.id.to_string();
    let e = email.clone();
    let taken = with_db(&state, move |db| {
        let rows = db.find_users_by_username_or_email(None, Some(&e))?;
        Ok(rows.iter().any(|row| row.id != user_id))
    })
    .await?;
    if taken {
        return Err(ApiError::conflict("Email already exists"));
    }

    let user_id = user.id.to_string();
    let updated = with_db(&state, move |db| {
        db.update_account_details(&user_id, &full_name, &email)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User does not exist"))?
    .into_user()?;

    Ok(reply(StatusCode::OK, updated, "Account details updated successfully"))
}

/// Which stored image an upload replaces.
#[derive(Debug, Clone, Copy)]
enum ImageSlot {
    Avatar,
    CoverImage,
}

impl ImageSlot {
    fn field(self) -> &'static str {
        match self {
            Self::Avatar => "avatar",
            Self::CoverImage => "coverImage",
        }
    }

    fn missing_message(self) -> &'static str {
        match self {
            Self::Avatar => "Avatar file is missing",
            Self::CoverImage => "Cover image file is missing",
        }
    }

    fn upload_failed_message(self) -> &'static str {
        match self {
            Self::Avatar => "Error while uploading avatar",
            Self::CoverImage => "Error while uploading cover image",
        }
    }

    fn updated_message(self) -> &'static str {
        match self {
            Self::Avatar => "Avatar image updated successfully",
            Self::CoverImage => "Cover image updated successfully",
        }
    }
}

/// PATCH /users/avatar
pub async fn update_user_avatar(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    WithRejection(multipart, _): WithRejection<Multipart, ApiError>,
) -> ApiResult<impl IntoResponse> {
    replace_image(state, user.id.to_string(), multipart, ImageSlot::Avatar).await
}

/// PATCH /users/cover-image
pub async fn update_user_cover_image(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    WithRejection(multipart, _): WithRejection<Multipart, ApiError>,
) -> ApiResult<impl IntoResponse> {
    replace_image(state, user.id.to_string(), multipart, ImageSlot::CoverImage).await
}

/// Upload the new file and overwrite the stored URL. The previous remote
/// asset is left in place.
async fn replace_image(
    state: AppState,
    user_id: String,
    multipart: Multipart,
    slot: ImageSlot,
) -> ApiResult<impl IntoResponse> {
    let mut form = MultipartForm::read(multipart, &state.upload_dir).await?;
    let file = form
        .take_file(slot.field())
        .ok_or_else(|| ApiError::bad_request(slot.missing_message()))?;

    let media = state.media.upload(file.path()).await.map_err(|e| {
        warn!("{} upload failed for user {}: {:#}", slot.field(), user_id, e);
        ApiError::bad_request(slot.upload_failed_message())
    })?;
    drop(file);

    let updated = with_db(&state, move |db| match slot {
        ImageSlot::Avatar => db.update_avatar(&user_id, &media.url),
        ImageSlot::CoverImage => db.update_cover_image(&user_id, &media.url),
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User does not exist"))?
    .into_user()?;

    Ok(reply(StatusCode::OK, updated, slot.updated_message()))
}
