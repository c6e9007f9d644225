use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use askq_types::channels::{self, ChannelKind};
use askq_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::{Dispatcher, new_socket_id};

const PING_EVERY: Duration = Duration::from_secs(15);
/// Unanswered pings after which the socket counts as gone.
const MAX_MISSED_PONGS: u8 = 2;

type Subscriptions = Arc<RwLock<HashSet<String>>>;

/// Serve one WebSocket connection until either side goes away.
///
/// Connections are anonymous at this layer: identity only matters for
/// presence channels, where it arrives as signed `channel_data`.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher) {
    let (mut sender, mut receiver) = socket.split();
    let socket_id = new_socket_id();

    // Subscribe before anything can be published for this socket.
    let mut broadcast_rx = dispatcher.subscribe();

    let ready = GatewayEvent::Ready {
        socket_id: socket_id.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }
    info!("socket {} connected to gateway", socket_id);

    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();
    let send_socket_id = socket_id.clone();

    let alive = Arc::new(AtomicBool::new(true));
    let alive_seen = alive.clone();

    let mut send_task = tokio::spawn(async move {
        let mut pings = tokio::time::interval(PING_EVERY);
        pings.tick().await;
        let mut unanswered: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let envelope = match result {
                        Ok(envelope) => envelope,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            // Delivery is at-most-once; clients resync on their own.
                            warn!("socket {} lagged by {} frames", send_socket_id, n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let wanted = {
                        let subs = send_subscriptions.read().await;
                        envelope.is_for(&send_socket_id, &subs)
                    };
                    if !wanted {
                        continue;
                    }

                    if send_event(&mut sender, &envelope.event).await.is_err() {
                        break;
                    }
                }
                _ = pings.tick() => {
                    unanswered = if alive.swap(false, Ordering::Acquire) { 0 } else { unanswered + 1 };
                    if unanswered >= MAX_MISSED_PONGS {
                        warn!("socket {} stopped answering pings", send_socket_id);
                        break;
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_dispatcher = dispatcher.clone();
    let recv_subscriptions = subscriptions.clone();
    let recv_socket_id = socket_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&recv_dispatcher, &recv_socket_id, cmd, &recv_subscriptions).await;
                    }
                    Err(e) => {
                        warn!(
                            "socket {} bad command: {} -- raw: {}",
                            recv_socket_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => alive_seen.store(true, Ordering::Release),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let subscribed = subscriptions.read().await.clone();
    dispatcher.socket_closed(&socket_id, &subscribed).await;
    info!("socket {} disconnected from gateway", socket_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("failed to encode gateway frame: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

async fn handle_command(
    dispatcher: &Dispatcher,
    socket_id: &str,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
) {
    match cmd {
        GatewayCommand::Subscribe {
            channel,
            auth,
            channel_data,
        } => {
            let member = match dispatcher.authorize(
                socket_id,
                &channel,
                auth.as_deref(),
                channel_data.as_deref(),
            ) {
                Ok(member) => member,
                Err(e) => {
                    warn!("socket {} refused on {}: {}", socket_id, channel, e);
                    dispatcher.send_to_socket(
                        socket_id,
                        GatewayEvent::SubscriptionError {
                            channel,
                            reason: e.to_string(),
                        },
                    );
                    return;
                }
            };

            debug!("socket {} subscribed to {}", socket_id, channel);
            subscriptions.write().await.insert(channel.clone());

            match member {
                Some(member) => dispatcher.presence_join(&channel, socket_id, member).await,
                None => dispatcher.send_to_socket(socket_id, GatewayEvent::Subscribed { channel }),
            }
        }

        GatewayCommand::Unsubscribe { channel } => {
            let was_subscribed = subscriptions.write().await.remove(&channel);
            if !was_subscribed {
                return;
            }

            debug!("socket {} unsubscribed from {}", socket_id, channel);
            if matches!(channels::classify(&channel), Some(ChannelKind::Presence)) {
                dispatcher.presence_leave(&channel, socket_id).await;
            }
        }
    }
}
