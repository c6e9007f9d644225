use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use askq_types::api::Claims;

use crate::auth::AppState;

/// Identity of the caller, if it presented a valid session token.
///
/// Public routes (submission, overlay reads, chatbot intake) accept anonymous
/// callers, so a missing or bad token is not rejected here. Handlers that need
/// an identity turn `None` into 401 through the lifecycle service.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<Claims>);

impl Viewer {
    pub fn claims(&self) -> Option<&Claims> {
        self.0.as_ref()
    }
}

/// Extract and validate the JWT from the Authorization header.
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let claims = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| decode_token(&state.jwt_secret, token));

    req.extensions_mut().insert(Viewer(claims));
    next.run(req).await
}

pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            debug!("Rejected session token: {}", e);
            None
        }
    }
}
