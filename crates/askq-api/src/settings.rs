use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};

use askq_types::api::{LoginRequiredQuery, SetLoginRequiredRequest};
use askq_types::models::Settings;

use crate::auth::AppState;
use crate::error::QueueError;
use crate::lifecycle::OwnerRef;
use crate::middleware::Viewer;

/// `?userId=` wins over `?username=` when both are given.
pub async fn get_login_required(
    State(state): State<AppState>,
    Query(query): Query<LoginRequiredQuery>,
) -> Result<impl IntoResponse, QueueError> {
    let owner = match (query.user_id, query.username) {
        (Some(id), _) => OwnerRef::Id(id),
        (None, Some(name)) if !name.is_empty() => OwnerRef::Username(name),
        _ => {
            return Err(QueueError::Validation(
                "userId or username is required".to_string(),
            ));
        }
    };

    let requires_login = state.queue.login_required(owner).await?;
    Ok(Json(Settings { requires_login }))
}

pub async fn set_login_required(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Json(req): Json<SetLoginRequiredRequest>,
) -> Result<impl IntoResponse, QueueError> {
    let settings = state
        .queue
        .set_requires_login(viewer.claims(), req.login_required)
        .await?;
    Ok(Json(settings))
}
