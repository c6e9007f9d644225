use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, error};

use askq_db::models::UserRow;
use askq_types::api::UserMetadata;

use crate::auth::AppState;
use crate::db_call;
use crate::middleware::Viewer;

/// Public owner metadata for the ask page. Names match case-insensitively.
pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = db_call(&state.db, move |db| db.get_user_by_username(&username))
        .await
        .map_err(|e| {
            error!("User lookup failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(metadata(user)?))
}

/// Moderator gate for `/mod/{username}`: the channel's metadata when the caller
/// is on its moderator list, 404 otherwise (including when not signed in).
pub async fn moderated_channel(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let login = viewer.claims().ok_or(StatusCode::NOT_FOUND)?.username.clone();

    let channel = db_call(&state.db, move |db| {
        if !db.is_moderator(&username, &login)? {
            debug!("{} is not a moderator of {}", login, username);
            return Ok(None);
        }
        db.get_user_by_username(&username)
    })
    .await
    .map_err(|e| {
        error!("Moderator lookup failed: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(metadata(channel)?))
}

fn metadata(user: UserRow) -> Result<UserMetadata, StatusCode> {
    Ok(UserMetadata {
        id: user.id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
        username: user.username,
        image: user.image,
    })
}
