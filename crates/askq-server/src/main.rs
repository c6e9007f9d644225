mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use askq_api::auth::{AppState, AppStateInner};
use askq_crypto::channel_auth::ChannelSigner;
use askq_gateway::connection;
use askq_gateway::dispatcher::Dispatcher;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "askq=debug,askq_api=debug,askq_gateway=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            std::process::exit(1);
        }
    };

    // Init database
    let db = Arc::new(askq_db::Database::open(&PathBuf::from(&config.db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new(ChannelSigner::new(
        config.channel_key.clone(),
        &config.channel_secret,
    ));
    if config.eventsub_secret.is_none() {
        info!("ASKQ_EVENTSUB_SECRET unset, moderator sync webhook disabled");
    }
    let app_state: AppState = Arc::new(AppStateInner::new(
        db,
        dispatcher.clone(),
        config.jwt_secret.clone(),
        config.bridge_secret.clone(),
        config.eventsub_secret.clone(),
        config.fossabot_api_base.clone(),
    ));

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(dispatcher);

    let app = Router::new()
        .merge(askq_api::routes::router(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("askq server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(dispatcher): State<Dispatcher>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher))
}
