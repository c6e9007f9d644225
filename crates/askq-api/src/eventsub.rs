//! Twitch EventSub webhook keeping each channel's moderator list current.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use askq_crypto::webhook::verify_eventsub_signature;

use crate::auth::AppState;
use crate::db_call;

pub const MESSAGE_ID_HEADER: &str = "twitch-eventsub-message-id";
pub const MESSAGE_TIMESTAMP_HEADER: &str = "twitch-eventsub-message-timestamp";
pub const MESSAGE_SIGNATURE_HEADER: &str = "twitch-eventsub-message-signature";
pub const MESSAGE_TYPE_HEADER: &str = "twitch-eventsub-message-type";

const CALLBACK_VERIFICATION: &str = "webhook_callback_verification";
const MODERATOR_ADD: &str = "channel.moderator.add";
const MODERATOR_REMOVE: &str = "channel.moderator.remove";

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(default)]
    challenge: Option<String>,
    subscription: Subscription,
    #[serde(default)]
    event: Option<ModeratorEvent>,
}

#[derive(Debug, Deserialize)]
struct Subscription {
    #[serde(rename = "type")]
    kind: String,
    condition: Condition,
}

#[derive(Debug, Deserialize)]
struct Condition {
    broadcaster_user_id: String,
    #[serde(default)]
    broadcaster_user_login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModeratorEvent {
    user_login: String,
}

pub async fn twitch_eventsub(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(secret) = state.eventsub_secret.as_deref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if !verify_eventsub_signature(
        secret.as_bytes(),
        header(MESSAGE_ID_HEADER),
        header(MESSAGE_TIMESTAMP_HEADER),
        &body,
        header(MESSAGE_SIGNATURE_HEADER),
    ) {
        warn!("EventSub signature verification failed");
        return (StatusCode::FORBIDDEN, "Signature verification failed").into_response();
    }

    let notification: Notification = match serde_json::from_slice(&body) {
        Ok(n) => n,
        Err(e) => {
            warn!("EventSub payload did not decode: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    if header(MESSAGE_TYPE_HEADER) == CALLBACK_VERIFICATION {
        info!("EventSub callback verification for {}", notification.subscription.kind);
        return (StatusCode::OK, notification.challenge.unwrap_or_default()).into_response();
    }

    let kind = notification.subscription.kind.as_str();
    let added = match kind {
        MODERATOR_ADD => true,
        MODERATOR_REMOVE => false,
        other => {
            info!("Ignoring EventSub notification {}", other);
            return (StatusCode::OK, "OK").into_response();
        }
    };
    let Some(event) = notification.event else {
        warn!("EventSub {} without an event body", kind);
        return (StatusCode::OK, "OK").into_response();
    };

    let condition = notification.subscription.condition;
    info!(
        "[EventSub] moderator {} {} channel {}",
        event.user_login,
        if added { "added to" } else { "removed from" },
        condition.broadcaster_user_login.as_deref().unwrap_or(&condition.broadcaster_user_id),
    );

    let broadcaster = condition.broadcaster_user_id;
    let login = event.user_login;
    let result = db_call(&state.db, move |db| {
        let Some(user) = db.get_user_by_provider_account(&broadcaster)? else {
            warn!("[EventSub] no user for broadcaster {}, skipping", broadcaster);
            return Ok(());
        };
        if added {
            db.add_moderator(&user.id, &login)
        } else {
            db.remove_moderator(&user.id, &login)
        }
    })
    .await;

    match result {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            error!("EventSub moderator sync failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
