use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use askq_types::api::SubmitQuestionRequest;

use crate::auth::AppState;
use crate::error::QueueError;
use crate::middleware::Viewer;

/// Anyone may ask; the owner's settings decide whether a session is needed.
pub async fn submit_question(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Json(req): Json<SubmitQuestionRequest>,
) -> Result<impl IntoResponse, QueueError> {
    let question = state
        .queue
        .submit(req.owner_user_id, req.question, viewer.claims())
        .await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn list_questions(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, QueueError> {
    let questions = state.queue.list_active(viewer.claims()).await?;
    Ok(Json(questions))
}

/// Public; the overlay is not signed in.
pub async fn get_pinned(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
) -> Result<impl IntoResponse, QueueError> {
    Ok(Json(state.queue.pinned(owner_id).await?))
}

pub async fn pin_question(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(question_id): Path<Uuid>,
) -> Result<impl IntoResponse, QueueError> {
    let question = state.queue.pin(viewer.claims(), question_id).await?;
    Ok(Json(question))
}

pub async fn unpin_question(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, QueueError> {
    state.queue.unpin(viewer.claims()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn archive_question(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(question_id): Path<Uuid>,
) -> Result<impl IntoResponse, QueueError> {
    state.queue.archive(viewer.claims(), question_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn archive_all(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, QueueError> {
    state.queue.archive_all(viewer.claims()).await?;
    Ok(StatusCode::NO_CONTENT)
}
