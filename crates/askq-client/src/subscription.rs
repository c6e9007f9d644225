use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use askq_types::channels::{self, ChannelKind};
use askq_types::events::{GatewayCommand, GatewayEvent, PresenceEvent};

use crate::api::ChannelAuthorizer;
use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// One live subscription to one channel over its own gateway connection.
///
/// The owner of this value owns the subscription: [`close`](Self::close)
/// unsubscribes cleanly, and dropping it tears the connection down.
pub struct ChannelSubscription {
    channel: String,
    socket_id: String,
    sink: WsSink,
    events: mpsc::Receiver<GatewayEvent>,
    reader: JoinHandle<()>,
}

impl ChannelSubscription {
    /// Subscribe to a channel that needs no authorization (`user-<ownerId>`).
    pub async fn open(gateway_url: &str, channel: &str) -> Result<Self, ClientError> {
        let (sink, source, socket_id) = handshake(gateway_url).await?;
        let command = GatewayCommand::Subscribe {
            channel: channel.to_string(),
            auth: None,
            channel_data: None,
        };
        Self::subscribe(sink, source, socket_id, channel, command).await
    }

    /// Subscribe to a `presence-*` or `private-*` channel, fetching the
    /// token for this connection's socket id from `authorizer`.
    pub async fn open_authorized(
        gateway_url: &str,
        channel: &str,
        authorizer: &impl ChannelAuthorizer,
    ) -> Result<Self, ClientError> {
        let (sink, source, socket_id) = handshake(gateway_url).await?;
        let auth = authorizer.authorize_channel(&socket_id, channel).await?;
        let command = GatewayCommand::Subscribe {
            channel: channel.to_string(),
            auth: Some(auth.auth),
            channel_data: auth.channel_data,
        };
        Self::subscribe(sink, source, socket_id, channel, command).await
    }

    async fn subscribe(
        mut sink: WsSink,
        mut source: WsSource,
        socket_id: String,
        channel: &str,
        command: GatewayCommand,
    ) -> Result<Self, ClientError> {
        send_command(&mut sink, &command).await?;

        // Frames up to and including the acknowledgement belong to the caller too
        // (a presence ack carries the roster).
        let (tx, events) = mpsc::channel(256);
        loop {
            let event = next_frame(&mut source)
                .await?
                .ok_or_else(|| ClientError::Protocol("connection closed before subscribing".into()))?;
            if event.channel() != Some(channel) {
                continue;
            }
            if let GatewayEvent::SubscriptionError { reason, .. } = &event {
                return Err(ClientError::Protocol(format!("subscription to {channel} refused: {reason}")));
            }
            let acknowledged = matches!(
                event,
                GatewayEvent::Subscribed { .. }
                    | GatewayEvent::Presence { event: PresenceEvent::SubscriptionSucceeded { .. }, .. }
            );
            let _ = tx.send(event).await;
            if acknowledged {
                break;
            }
        }
        info!("subscribed to {} as socket {}", channel, socket_id);

        let reader = tokio::spawn(read_loop(source, channel.to_string(), tx));
        Ok(Self {
            channel: channel.to_string(),
            socket_id,
            sink,
            events,
            reader,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn socket_id(&self) -> &str {
        &self.socket_id
    }

    /// Whether this subscription reports membership.
    pub fn is_presence(&self) -> bool {
        matches!(channels::classify(&self.channel), Some(ChannelKind::Presence))
    }

    /// Next frame for this channel; `None` once the connection is gone.
    pub async fn next_event(&mut self) -> Option<GatewayEvent> {
        self.events.recv().await
    }

    /// Unsubscribe and close the connection.
    pub async fn close(mut self) -> Result<(), ClientError> {
        let command = GatewayCommand::Unsubscribe { channel: self.channel.clone() };
        send_command(&mut self.sink, &command).await?;
        self.sink.send(Message::Close(None)).await?;
        debug!("closed subscription to {}", self.channel);
        Ok(())
    }
}

impl Drop for ChannelSubscription {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn handshake(gateway_url: &str) -> Result<(WsSink, WsSource, String), ClientError> {
    let (stream, _) = connect_async(gateway_url).await?;
    let (sink, mut source) = stream.split();

    match next_frame(&mut source).await? {
        Some(GatewayEvent::Ready { socket_id }) => Ok((sink, source, socket_id)),
        Some(other) => Err(ClientError::Protocol(format!("expected Ready, got {other:?}"))),
        None => Err(ClientError::Protocol("connection closed before Ready".into())),
    }
}

async fn send_command(sink: &mut WsSink, command: &GatewayCommand) -> Result<(), ClientError> {
    let text = serde_json::to_string(command)
        .map_err(|e| ClientError::Protocol(format!("failed to encode command: {e}")))?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

/// Next gateway frame, skipping control and undecodable frames.
async fn next_frame(source: &mut WsSource) -> Result<Option<GatewayEvent>, ClientError> {
    while let Some(msg) = source.next().await {
        match msg? {
            Message::Text(text) => match serde_json::from_str::<GatewayEvent>(&text) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => warn!("undecodable gateway frame: {}", e),
            },
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

async fn read_loop(mut source: WsSource, channel: String, tx: mpsc::Sender<GatewayEvent>) {
    loop {
        match next_frame(&mut source).await {
            Ok(Some(event)) => {
                if event.channel() != Some(channel.as_str()) {
                    continue;
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("gateway connection for {} failed: {}", channel, e);
                break;
            }
        }
    }
    debug!("reader for {} stopped", channel);
}
