//! Channel authorization for the real-time gateway.
//!
//! Clients post the form body a hosted pub/sub client library would
//! (`socket_id`, `channel_name`) plus a `user_id` header carrying their
//! identity: the signed-in user id for dashboards, a random per-session id
//! for anonymous viewers. The returned token is checked by the gateway when
//! the socket subscribes.

use axum::{
    Extension, Form, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::json;
use tracing::{debug, warn};

use askq_crypto::channel_auth::is_valid_socket_id;
use askq_types::api::{ChannelAuthRequest, ChannelAuthResponse, UserAuthRequest, UserAuthResponse};
use askq_types::channels::{self, ChannelKind};

use crate::auth::AppState;
use crate::middleware::Viewer;

pub const USER_ID_HEADER: &str = "user_id";

fn caller_identity(headers: &HeaderMap) -> Result<String, StatusCode> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(StatusCode::NOT_FOUND)
}

fn display_name(viewer: &Viewer) -> String {
    viewer
        .claims()
        .map(|c| c.username.clone())
        .unwrap_or_else(|| "anonymous".to_string())
}

pub async fn auth_channel(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    headers: HeaderMap,
    Form(req): Form<ChannelAuthRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = caller_identity(&headers)?;

    if !is_valid_socket_id(&req.socket_id) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let signer = state.dispatcher.signer();
    let response = match channels::classify(&req.channel_name) {
        Some(ChannelKind::Presence) => {
            let channel_data = json!({
                "user_id": user_id,
                "user_info": { "name": display_name(&viewer) },
            })
            .to_string();
            ChannelAuthResponse {
                auth: signer.sign_channel(&req.socket_id, &req.channel_name, Some(&channel_data)),
                channel_data: Some(channel_data),
            }
        }
        Some(ChannelKind::Private) | Some(ChannelKind::Owner(_)) => ChannelAuthResponse {
            auth: signer.sign_channel(&req.socket_id, &req.channel_name, None),
            channel_data: None,
        },
        None => {
            warn!("Refusing to authorize unknown channel {}", req.channel_name);
            return Err(StatusCode::FORBIDDEN);
        }
    };

    debug!("Authorized {} on {} for {}", req.socket_id, req.channel_name, user_id);
    Ok(Json(response))
}

pub async fn auth_user(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    headers: HeaderMap,
    Form(req): Form<UserAuthRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = caller_identity(&headers)?;

    if !is_valid_socket_id(&req.socket_id) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user_data = json!({ "id": user_id, "name": display_name(&viewer) }).to_string();
    let auth = state.dispatcher.signer().sign_user(&req.socket_id, &user_data);

    Ok(Json(UserAuthResponse { auth, user_data }))
}
