use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// Session token claims, shared by the HTTP middleware and the client crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Sign-in (identity bridge) --

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub provider_account_id: String,
    pub username: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub moderators: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Questions --

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubmitQuestionRequest {
    pub owner_user_id: Uuid,
    pub question: String,
}

/// What the overlay needs to render the pinned question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PinnedQuestionResponse {
    pub question: String,
    pub author: Option<String>,
}

// -- Settings --

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequiredQuery {
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetLoginRequiredRequest {
    pub login_required: bool,
}

// -- Users --

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserMetadata {
    pub id: Uuid,
    pub username: String,
    pub image: Option<String>,
}

// -- Realtime channel authorization --

#[derive(Debug, Deserialize, Serialize)]
pub struct ChannelAuthRequest {
    pub socket_id: String,
    pub channel_name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChannelAuthResponse {
    pub auth: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UserAuthRequest {
    pub socket_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UserAuthResponse {
    pub auth: String,
    pub user_data: String,
}

// -- Errors --

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
