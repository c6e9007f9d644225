use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::{self, AppState};
use crate::middleware::authenticate;
use crate::{chatbots, eventsub, questions, realtime, settings, users};

/// Every HTTP route of the API. The WebSocket gateway is mounted by the server.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/sign-in", post(auth::sign_in))
        .route(
            "/questions",
            get(questions::list_questions).post(questions::submit_question),
        )
        .route("/questions/pinned/{owner_id}", get(questions::get_pinned))
        .route("/questions/unpin", post(questions::unpin_question))
        .route("/questions/archive-all", post(questions::archive_all))
        .route("/questions/{question_id}/pin", post(questions::pin_question))
        .route("/questions/{question_id}/archive", post(questions::archive_question))
        .route(
            "/settings/login-required",
            get(settings::get_login_required).put(settings::set_login_required),
        )
        .route("/users/{username}", get(users::get_user))
        .route("/mod/{username}", get(users::moderated_channel))
        .route("/realtime/auth-channel", post(realtime::auth_channel))
        .route("/realtime/auth-user", post(realtime::auth_user))
        .route("/external/chatbots", get(chatbots::chatbot_question))
        .route("/external/fossabot", get(chatbots::fossabot_question))
        .route("/external/twitch/eventsub", post(eventsub::twitch_eventsub))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .with_state(state)
}
