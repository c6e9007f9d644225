use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use askq_types::api::{ChannelAuthResponse, ErrorBody, PinnedQuestionResponse};
use askq_types::models::{Question, Settings};

use crate::error::ClientError;

/// Owner-scoped queue operations the dashboard drives.
#[allow(async_fn_in_trait)]
pub trait QueueApi {
    async fn list_active(&self) -> Result<Vec<Question>, ClientError>;
    async fn pin(&self, question_id: Uuid) -> Result<Question, ClientError>;
    async fn unpin(&self) -> Result<(), ClientError>;
    async fn archive(&self, question_id: Uuid) -> Result<(), ClientError>;
    async fn archive_all(&self) -> Result<(), ClientError>;
}

/// Issues tokens for `presence-*` and `private-*` subscriptions.
#[allow(async_fn_in_trait)]
pub trait ChannelAuthorizer {
    async fn authorize_channel(
        &self,
        socket_id: &str,
        channel: &str,
    ) -> Result<ChannelAuthResponse, ClientError>;
}

/// HTTP client for the askq API.
#[derive(Clone)]
pub struct HttpQueueApi {
    http: Client,
    base_url: String,
    token: Option<String>,
    /// Sent as the `user_id` header on channel authorization.
    identity: String,
}

impl HttpQueueApi {
    /// Anonymous client with a random per-session identity.
    pub fn anonymous(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            identity: format!("anon-{}", Uuid::new_v4()),
        }
    }

    /// Client for a signed-in user; its user id doubles as the channel identity.
    pub fn signed_in(base_url: impl Into<String>, token: impl Into<String>, user_id: Uuid) -> Self {
        Self {
            token: Some(token.into()),
            identity: user_id.to_string(),
            ..Self::anonymous(base_url)
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    pub async fn submit(&self, owner_id: Uuid, question: &str) -> Result<Question, ClientError> {
        let resp = self
            .request(reqwest::Method::POST, "/questions")
            .json(&json!({ "ownerUserId": owner_id, "question": question }))
            .send()
            .await?;
        decode(resp).await
    }

    /// Currently pinned question of an owner; public.
    pub async fn pinned(&self, owner_id: Uuid) -> Result<Option<PinnedQuestionResponse>, ClientError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/questions/pinned/{owner_id}"))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn login_required(&self, owner_id: Uuid) -> Result<bool, ClientError> {
        let resp = self
            .request(reqwest::Method::GET, "/settings/login-required")
            .query(&[("userId", owner_id.to_string())])
            .send()
            .await?;
        let settings: Settings = decode(resp).await?;
        Ok(settings.requires_login)
    }

    pub async fn set_login_required(&self, login_required: bool) -> Result<Settings, ClientError> {
        let resp = self
            .request(reqwest::Method::PUT, "/settings/login-required")
            .json(&json!({ "loginRequired": login_required }))
            .send()
            .await?;
        decode(resp).await
    }
}

impl QueueApi for HttpQueueApi {
    async fn list_active(&self) -> Result<Vec<Question>, ClientError> {
        let resp = self.request(reqwest::Method::GET, "/questions").send().await?;
        decode(resp).await
    }

    async fn pin(&self, question_id: Uuid) -> Result<Question, ClientError> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/questions/{question_id}/pin"))
            .send()
            .await?;
        decode(resp).await
    }

    async fn unpin(&self) -> Result<(), ClientError> {
        let resp = self.request(reqwest::Method::POST, "/questions/unpin").send().await?;
        check(resp).await.map(drop)
    }

    async fn archive(&self, question_id: Uuid) -> Result<(), ClientError> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/questions/{question_id}/archive"))
            .send()
            .await?;
        check(resp).await.map(drop)
    }

    async fn archive_all(&self) -> Result<(), ClientError> {
        let resp = self
            .request(reqwest::Method::POST, "/questions/archive-all")
            .send()
            .await?;
        check(resp).await.map(drop)
    }
}

impl ChannelAuthorizer for HttpQueueApi {
    async fn authorize_channel(
        &self,
        socket_id: &str,
        channel: &str,
    ) -> Result<ChannelAuthResponse, ClientError> {
        let resp = self
            .request(reqwest::Method::POST, "/realtime/auth-channel")
            .header("user_id", &self.identity)
            .form(&[("socket_id", socket_id), ("channel_name", channel)])
            .send()
            .await?;
        decode(resp).await
    }
}

/// Turn non-2xx responses into [`ClientError::Status`], keeping the server's message.
async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(ClientError::Status { status: status.as_u16(), message })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    Ok(check(resp).await?.json().await?)
}
