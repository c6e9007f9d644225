use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info, warn};
use uuid::Uuid;

use askq_db::Database;
use askq_gateway::dispatcher::Dispatcher;
use askq_types::api::{Claims, SignInRequest, SignInResponse};

use crate::db_call;
use crate::lifecycle::QueueService;

pub const BRIDGE_SECRET_HEADER: &str = "x-askq-bridge-secret";

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub queue: QueueService,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub bridge_secret: String,
    /// `None` disables the EventSub webhook.
    pub eventsub_secret: Option<String>,
    pub fossabot_api_base: String,
    pub http: reqwest::Client,
}

impl AppStateInner {
    /// Wire the lifecycle service to the dispatcher so every committed
    /// transition reaches the owner's real-time channel.
    pub fn new(
        db: Arc<Database>,
        dispatcher: Dispatcher,
        jwt_secret: String,
        bridge_secret: String,
        eventsub_secret: Option<String>,
        fossabot_api_base: String,
    ) -> Self {
        let queue = QueueService::new(db.clone(), Arc::new(dispatcher.clone()));
        Self {
            db,
            queue,
            dispatcher,
            jwt_secret,
            bridge_secret,
            eventsub_secret,
            fossabot_api_base,
            http: reqwest::Client::new(),
        }
    }
}

/// Called by the external identity bridge once the platform OAuth flow is done.
pub async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SignInRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let presented = headers
        .get(BRIDGE_SECRET_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();
    if !askq_crypto::secrets_match(state.bridge_secret.as_bytes(), presented) {
        warn!("Sign-in rejected: bad bridge secret");
        return Err(StatusCode::UNAUTHORIZED);
    }

    if req.provider_account_id.is_empty() || req.username.is_empty() || req.username.len() > 32 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let new_id = Uuid::new_v4().to_string();
    let (user, created) = db_call(&state.db, move |db| {
        db.upsert_user(
            &new_id,
            &req.provider_account_id,
            &req.username,
            req.image.as_deref(),
            &req.moderators,
        )
    })
    .await
    .map_err(|e| {
        error!("Sign-in failed: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let user_id: Uuid = user.id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if created {
        info!("New user {} ({})", user.username, user_id);
    }

    let token = create_token(&state.jwt_secret, user_id, &user.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(SignInResponse {
        user_id,
        username: user.username,
        token,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
