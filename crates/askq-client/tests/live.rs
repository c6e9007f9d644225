//! Clients against a real server on a loopback port.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade, ws::Message},
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};

use askq_api::auth::{AppStateInner, BRIDGE_SECRET_HEADER};
use askq_client::{ChannelSubscription, Dashboard, EmbedState, HttpQueueApi, PresenceTracker};
use askq_crypto::channel_auth::ChannelSigner;
use askq_db::Database;
use askq_gateway::connection;
use askq_gateway::dispatcher::Dispatcher;
use askq_types::channels::{owner_channel, presence_channel};
use askq_types::events::{GatewayCommand, GatewayEvent, Member, PresenceEvent, QueueEvent};
use uuid::Uuid;

const BRIDGE_SECRET: &str = "bridge-test-secret";

struct Server {
    base: String,
    gateway: String,
}

async fn ws_upgrade(State(dispatcher): State<Dispatcher>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher))
}

async fn spawn_server() -> Server {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let dispatcher = Dispatcher::new(ChannelSigner::new("askq", "channel-test-secret"));
    let state = Arc::new(AppStateInner::new(
        db,
        dispatcher.clone(),
        "jwt-test-secret".into(),
        BRIDGE_SECRET.into(),
        None,
        "https://api.fossabot.com/".into(),
    ));
    let app = askq_api::routes::router(state).merge(
        Router::new()
            .route("/gateway", get(ws_upgrade))
            .with_state(dispatcher),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server {
        base: format!("http://{addr}"),
        gateway: format!("ws://{addr}/gateway"),
    }
}

async fn sign_in(server: &Server, account: &str, username: &str) -> HttpQueueApi {
    let body: Value = reqwest::Client::new()
        .post(format!("{}/auth/sign-in", server.base))
        .header(BRIDGE_SECRET_HEADER, BRIDGE_SECRET)
        .json(&json!({ "providerAccountId": account, "username": username }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let user_id: Uuid = body["userId"].as_str().unwrap().parse().unwrap();
    HttpQueueApi::signed_in(&server.base, body["token"].as_str().unwrap(), user_id)
}

async fn next(sub: &mut ChannelSubscription) -> GatewayEvent {
    tokio::time::timeout(Duration::from_secs(5), sub.next_event())
        .await
        .expect("timed out waiting for a gateway frame")
        .expect("subscription closed")
}

async fn follow(tracker: &mut PresenceTracker, sub: &mut ChannelSubscription) -> bool {
    tokio::time::timeout(Duration::from_secs(5), tracker.follow(sub))
        .await
        .expect("timed out waiting for a gateway frame")
}

async fn next_queue_event(sub: &mut ChannelSubscription) -> QueueEvent {
    loop {
        if let GatewayEvent::Queue { event, .. } = next(sub).await {
            return event;
        }
    }
}

async fn next_presence_event(sub: &mut ChannelSubscription) -> PresenceEvent {
    loop {
        if let GatewayEvent::Presence { event, .. } = next(sub).await {
            return event;
        }
    }
}

#[tokio::test]
async fn dashboard_and_overlay_follow_the_owner_channel() {
    let server = spawn_server().await;
    let owner_api = sign_in(&server, "1", "theo").await;
    let owner_id: Uuid = owner_api.identity().parse().unwrap();
    let channel = owner_channel(owner_id);

    let mut dashboard_sub = ChannelSubscription::open(&server.gateway, &channel).await.unwrap();
    let mut overlay_sub = ChannelSubscription::open(&server.gateway, &channel).await.unwrap();
    assert_eq!(next(&mut dashboard_sub).await, GatewayEvent::Subscribed { channel: channel.clone() });

    let viewer = HttpQueueApi::anonymous(&server.base);
    let mut embed = EmbedState::seeded(viewer.pinned(owner_id).await);
    assert_eq!(embed.question(), None);

    let mut dashboard = Dashboard::new(owner_api.clone());
    dashboard.sync().await.unwrap();
    assert!(dashboard.state().questions().is_empty());

    viewer.submit(owner_id, "Is this live?").await.unwrap();
    let event = next_queue_event(&mut dashboard_sub).await;
    assert_eq!(event, QueueEvent::NewQuestion {});
    dashboard.handle_event(&event).await;
    assert_eq!(dashboard.state().questions().len(), 1);

    assert_eq!(next_queue_event(&mut overlay_sub).await, QueueEvent::NewQuestion {});
    dashboard.next_question().await.unwrap();
    embed.apply(&next_queue_event(&mut overlay_sub).await);
    assert_eq!(embed.question(), Some("Is this live?"));
    assert_eq!(embed.author(), "Anonymous");

    dashboard.unpin().await.unwrap();
    let event = next_queue_event(&mut overlay_sub).await;
    assert_eq!(event, QueueEvent::QuestionUnpinned {});
    embed.apply(&event);
    assert_eq!(embed.question(), None);

    dashboard_sub.close().await.unwrap();
}

#[tokio::test]
async fn presence_counts_other_dashboards() {
    let server = spawn_server().await;
    let owner_api = sign_in(&server, "1", "theo").await;
    let owner_id: Uuid = owner_api.identity().parse().unwrap();
    let channel = presence_channel(owner_id);

    let mut first = ChannelSubscription::open_authorized(&server.gateway, &channel, &owner_api)
        .await
        .unwrap();
    assert!(first.is_presence());
    let mut tracker = PresenceTracker::new(owner_api.identity());
    assert!(follow(&mut tracker, &mut first).await);
    assert!(tracker.is_synced());
    assert_eq!(tracker.others(), 0);

    let other_tab = HttpQueueApi::anonymous(&server.base);
    let mut second = ChannelSubscription::open_authorized(&server.gateway, &channel, &other_tab)
        .await
        .unwrap();
    match next_presence_event(&mut second).await {
        PresenceEvent::SubscriptionSucceeded { members } => assert_eq!(members.len(), 2),
        other => panic!("expected roster, got {other:?}"),
    }

    assert!(follow(&mut tracker, &mut first).await);
    assert_eq!(tracker.others(), 1);

    drop(second);
    assert!(follow(&mut tracker, &mut first).await);
    assert_eq!(tracker.others(), 0);
}

/// Sends the roster for whatever channel is requested, then hangs up.
async fn roster_then_hang_up(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(|mut socket| async move {
        let frame = |event: &GatewayEvent| Message::Text(serde_json::to_string(event).unwrap().into());
        if socket.send(frame(&GatewayEvent::Ready { socket_id: "1.1".into() })).await.is_err() {
            return;
        }
        let Some(Ok(Message::Text(text))) = socket.recv().await else {
            return;
        };
        let Ok(GatewayCommand::Subscribe { channel, .. }) = serde_json::from_str(&text) else {
            return;
        };
        let members = ["me", "other"]
            .map(|id| Member { user_id: id.into(), user_info: json!({}) })
            .to_vec();
        let roster = GatewayEvent::Presence {
            channel,
            event: PresenceEvent::SubscriptionSucceeded { members },
        };
        let _ = socket.send(frame(&roster)).await;
    })
}

#[tokio::test]
async fn a_dropped_connection_forgets_the_roster() {
    let app = Router::new().route("/gateway", get(roster_then_hang_up));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let channel = presence_channel(Uuid::new_v4());
    let mut sub = ChannelSubscription::open(&format!("ws://{addr}/gateway"), &channel)
        .await
        .unwrap();
    let mut tracker = PresenceTracker::new("me");

    assert!(follow(&mut tracker, &mut sub).await);
    assert_eq!(tracker.others(), 1);

    assert!(!follow(&mut tracker, &mut sub).await);
    assert!(!tracker.is_synced());
    assert_eq!(tracker.others(), 0);
}

#[tokio::test]
async fn presence_without_a_token_is_refused() {
    let server = spawn_server().await;
    let channel = presence_channel(Uuid::new_v4());
    assert!(ChannelSubscription::open(&server.gateway, &channel).await.is_err());
}
