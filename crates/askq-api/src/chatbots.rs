//! Question intake from chat bots.
//!
//! Nightbot and StreamElements call `/external/chatbots?channel=<name>&q=<text>`
//! from a custom command and paste the plain-text response into chat, so every
//! outcome is a short chat-friendly line. Fossabot instead hands us a one-shot
//! validate URL that leads to the message that triggered the command.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AppState;
use crate::db_call;
use crate::error::QueueError;

pub const NO_QUESTION: &str =
    "No question provided NotLikeThis Make sure you include a question after the command.";
pub const INVALID_REQUEST: &str = "Invalid request";
pub const USER_NOT_FOUND: &str = "User not found";
pub const LOGIN_REQUIRED: &str = "This channel only accepts questions from signed-in viewers.";
pub const TOO_LONG: &str = "Question is too long (max 400 characters).";
pub const SOMETHING_WENT_WRONG: &str = "Something went wrong, try again later.";
pub const QUESTION_ADDED: &str = "Question Added! SeemsGood";

pub const FOSSABOT_VALIDATE_HEADER: &str = "x-fossabot-validateurl";
pub const FOSSABOT_CHANNEL_HEADER: &str = "x-fossabot-channeldisplayname";

#[derive(Debug, Deserialize)]
pub struct ChatbotQuery {
    pub channel: Option<String>,
    pub q: Option<String>,
}

/// Why a bot submission did not go through.
#[derive(Debug)]
enum Rejection {
    BadRequest(&'static str),
    Internal,
}

impl Rejection {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, *message),
            Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, SOMETHING_WENT_WRONG),
        }
    }
}

impl From<QueueError> for Rejection {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::NotFound => Self::BadRequest(USER_NOT_FOUND),
            QueueError::Unauthorized => Self::BadRequest(LOGIN_REQUIRED),
            QueueError::Validation(_) => Self::BadRequest(TOO_LONG),
            QueueError::NotYours => Self::Internal,
            QueueError::Upstream(e) => {
                error!("Chatbot submission failed: {:#}", e);
                Self::Internal
            }
        }
    }
}

async fn resolve_owner(state: &AppState, channel: String) -> Result<Uuid, Rejection> {
    let user = db_call(&state.db, move |db| db.get_user_by_username(&channel))
        .await
        .map_err(|e| {
            error!("Chatbot owner lookup failed: {:#}", e);
            Rejection::Internal
        })?
        .ok_or(Rejection::BadRequest(USER_NOT_FOUND))?;

    user.id.parse().map_err(|_| Rejection::Internal)
}

async fn submit_anonymous(state: &AppState, channel: String, question: String) -> Result<(), Rejection> {
    let owner_id = resolve_owner(state, channel).await?;
    state.queue.submit(owner_id, question, None).await?;
    Ok(())
}

/// Nightbot / StreamElements endpoint.
pub async fn chatbot_question(
    State(state): State<AppState>,
    Query(query): Query<ChatbotQuery>,
) -> Response {
    let question = match query.q.filter(|q| !q.trim().is_empty()) {
        Some(q) => q,
        None => return (StatusCode::BAD_REQUEST, NO_QUESTION).into_response(),
    };
    let channel = match query.channel.filter(|c| !c.is_empty()) {
        Some(c) => c,
        None => return (StatusCode::BAD_REQUEST, INVALID_REQUEST).into_response(),
    };

    match submit_anonymous(&state, channel.clone(), question).await {
        Ok(()) => {
            info!("Chatbot question added for {}", channel);
            (StatusCode::OK, QUESTION_ADDED).into_response()
        }
        Err(rejection) => rejection.parts().into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct FossabotValidation {
    context_url: String,
}

#[derive(Debug, Deserialize)]
struct FossabotContext {
    message: FossabotMessage,
}

#[derive(Debug, Deserialize)]
struct FossabotMessage {
    content: String,
}

/// Fossabot endpoint. Errors are JSON `{"message": ...}`; success is an empty 200.
pub async fn fossabot_question(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match fossabot_submit(&state, &headers).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(rejection) => {
            let (status, message) = rejection.parts();
            (status, Json(json!({ "message": message }))).into_response()
        }
    }
}

async fn fossabot_submit(state: &AppState, headers: &HeaderMap) -> Result<(), Rejection> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let (Some(validate_url), Some(channel)) =
        (header(FOSSABOT_VALIDATE_HEADER), header(FOSSABOT_CHANNEL_HEADER))
    else {
        return Err(Rejection::BadRequest(INVALID_REQUEST));
    };

    // Only ever call back into Fossabot's own API.
    if !validate_url.starts_with(&state.fossabot_api_base) {
        warn!("Fossabot request with foreign validate URL {}", validate_url);
        return Err(Rejection::BadRequest(INVALID_REQUEST));
    }

    let owner_id = resolve_owner(state, channel.clone()).await?;

    let validation: FossabotValidation = fetch_json(state, &validate_url)
        .await
        .ok_or(Rejection::BadRequest("Failed to validate request."))?;

    if !validation.context_url.starts_with(&state.fossabot_api_base) {
        warn!("Fossabot validation returned foreign context URL {}", validation.context_url);
        return Err(Rejection::BadRequest("Failed to fetch message data"));
    }

    let context: FossabotContext = fetch_json(state, &validation.context_url)
        .await
        .ok_or(Rejection::BadRequest("Failed to fetch message data"))?;

    let question = strip_command(&context.message.content)
        .ok_or(Rejection::BadRequest("No question provided"))?;

    state.queue.submit(owner_id, question.to_string(), None).await?;
    info!("Fossabot question added for {}", channel);
    Ok(())
}

/// GET a URL and decode its JSON body; `None` on transport errors or non-200.
async fn fetch_json<T: serde::de::DeserializeOwned>(state: &AppState, url: &str) -> Option<T> {
    let response = match state.http.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Fossabot call to {} failed: {}", url, e);
            return None;
        }
    };
    if response.status() != reqwest::StatusCode::OK {
        warn!("Fossabot call to {} returned {}", url, response.status());
        return None;
    }
    match response.json::<T>().await {
        Ok(body) => Some(body),
        Err(e) => {
            warn!("Fossabot response from {} did not decode: {}", url, e);
            None
        }
    }
}

/// Drop the leading command word, e.g. `!ask`.
fn strip_command(content: &str) -> Option<&str> {
    let (_, rest) = content.trim_start().split_once(char::is_whitespace)?;
    let rest = rest.trim();
    (!rest.is_empty()).then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_word_is_stripped() {
        assert_eq!(strip_command("!ask how are you?"), Some("how are you?"));
        assert_eq!(strip_command("  !ask   spaced  "), Some("spaced"));
        assert_eq!(strip_command("!ask"), None);
        assert_eq!(strip_command("!ask    "), None);
    }
}
