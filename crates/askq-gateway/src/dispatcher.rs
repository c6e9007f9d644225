use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use askq_crypto::channel_auth::ChannelSigner;
use askq_types::channels::{self, ChannelKind};
use askq_types::events::{GatewayEvent, Member, PresenceEvent, QueueEvent};

use crate::bus::{EventBus, PublishError};

/// Who a broadcast frame is meant for.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Every socket subscribed to the frame's channel.
    Subscribers,
    /// Subscribers except the given socket.
    SubscribersExcept(String),
    /// One socket, whether or not it is subscribed.
    Socket(String),
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub event: GatewayEvent,
    pub target: Target,
}

impl Envelope {
    /// Whether the socket with `socket_id` and the given subscriptions should receive this frame.
    pub fn is_for(&self, socket_id: &str, subscriptions: &HashSet<String>) -> bool {
        let subscribed = || {
            self.event
                .channel()
                .is_some_and(|channel| subscriptions.contains(channel))
        };
        match &self.target {
            Target::Subscribers => subscribed(),
            Target::SubscribersExcept(except) => except != socket_id && subscribed(),
            Target::Socket(only) => only == socket_id,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubscribeError {
    #[error("unknown channel")]
    UnknownChannel,
    #[error("channel requires authorization")]
    MissingAuth,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("presence channels require channel_data with a user_id")]
    InvalidChannelData,
}

/// A presence member and the sockets it is connected through.
struct PresenceEntry {
    member: Member,
    sockets: HashSet<String>,
}

/// Fans events out to connected sockets and keeps presence rosters.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every frame goes through one broadcast channel so per-socket ordering
    /// matches the order in which the dispatcher produced the frames.
    broadcast_tx: broadcast::Sender<Envelope>,

    /// presence channel -> member id -> entry
    presence: RwLock<BTreeMap<String, BTreeMap<String, PresenceEntry>>>,

    signer: ChannelSigner,
}

impl Dispatcher {
    pub fn new(signer: ChannelSigner) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                presence: RwLock::new(BTreeMap::new()),
                signer,
            }),
        }
    }

    pub fn signer(&self) -> &ChannelSigner {
        &self.inner.signer
    }

    /// Subscribe to all frames. Each connection filters with [`Envelope::is_for`].
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inner.broadcast_tx.subscribe()
    }

    fn send(&self, event: GatewayEvent, target: Target) {
        let _ = self.inner.broadcast_tx.send(Envelope { event, target });
    }

    pub fn send_to_socket(&self, socket_id: &str, event: GatewayEvent) {
        self.send(event, Target::Socket(socket_id.to_string()));
    }

    /// Check whether `socket_id` may join `channel`. Returns the presence member
    /// for presence channels.
    pub fn authorize(
        &self,
        socket_id: &str,
        channel: &str,
        auth: Option<&str>,
        channel_data: Option<&str>,
    ) -> Result<Option<Member>, SubscribeError> {
        match channels::classify(channel) {
            None => Err(SubscribeError::UnknownChannel),
            // The overlay subscribes without any identity.
            Some(ChannelKind::Owner(_)) => Ok(None),
            Some(ChannelKind::Private) => {
                let auth = auth.ok_or(SubscribeError::MissingAuth)?;
                if !self.inner.signer.verify_channel(auth, socket_id, channel, None) {
                    return Err(SubscribeError::InvalidSignature);
                }
                Ok(None)
            }
            Some(ChannelKind::Presence) => {
                let auth = auth.ok_or(SubscribeError::MissingAuth)?;
                let data = channel_data.ok_or(SubscribeError::InvalidChannelData)?;
                if !self.inner.signer.verify_channel(auth, socket_id, channel, Some(data)) {
                    return Err(SubscribeError::InvalidSignature);
                }
                let member: Member =
                    serde_json::from_str(data).map_err(|_| SubscribeError::InvalidChannelData)?;
                if member.user_id.is_empty() {
                    return Err(SubscribeError::InvalidChannelData);
                }
                Ok(Some(member))
            }
        }
    }

    /// Add a socket to a presence roster. The joining socket gets the full
    /// roster; the others get `member_added` only when this is the member's
    /// first socket.
    pub async fn presence_join(&self, channel: &str, socket_id: &str, member: Member) {
        let mut presence = self.inner.presence.write().await;
        let roster = presence.entry(channel.to_string()).or_default();

        let is_new = !roster.contains_key(&member.user_id);
        let entry = roster
            .entry(member.user_id.clone())
            .or_insert_with(|| PresenceEntry {
                member: member.clone(),
                sockets: HashSet::new(),
            });
        entry.sockets.insert(socket_id.to_string());

        if is_new {
            debug!("{} joined {}", member.user_id, channel);
            self.send(
                GatewayEvent::Presence {
                    channel: channel.to_string(),
                    event: PresenceEvent::MemberAdded(member),
                },
                Target::SubscribersExcept(socket_id.to_string()),
            );
        }

        let members = roster.values().map(|e| e.member.clone()).collect();
        self.send_to_socket(
            socket_id,
            GatewayEvent::Presence {
                channel: channel.to_string(),
                event: PresenceEvent::SubscriptionSucceeded { members },
            },
        );
    }

    /// Remove a socket from a presence roster, announcing each member whose
    /// last socket this was. One socket may carry several members.
    pub async fn presence_leave(&self, channel: &str, socket_id: &str) {
        let mut presence = self.inner.presence.write().await;
        let Some(roster) = presence.get_mut(channel) else {
            return;
        };

        let emptied: Vec<String> = roster
            .iter_mut()
            .filter_map(|(id, entry)| {
                (entry.sockets.remove(socket_id) && entry.sockets.is_empty()).then(|| id.clone())
            })
            .collect();

        for member_id in emptied {
            if let Some(entry) = roster.remove(&member_id) {
                debug!("{} left {}", member_id, channel);
                self.send(
                    GatewayEvent::Presence {
                        channel: channel.to_string(),
                        event: PresenceEvent::MemberRemoved(entry.member),
                    },
                    Target::SubscribersExcept(socket_id.to_string()),
                );
            }
        }

        if roster.is_empty() {
            presence.remove(channel);
        }
    }

    /// Drop a disconnected socket from every presence channel it had joined.
    pub async fn socket_closed(&self, socket_id: &str, subscriptions: &HashSet<String>) {
        for channel in subscriptions {
            if matches!(channels::classify(channel), Some(ChannelKind::Presence)) {
                self.presence_leave(channel, socket_id).await;
            }
        }
    }

    /// Current roster of a presence channel.
    pub async fn members(&self, channel: &str) -> Vec<Member> {
        self.inner
            .presence
            .read()
            .await
            .get(channel)
            .map(|roster| roster.values().map(|e| e.member.clone()).collect())
            .unwrap_or_default()
    }
}

impl EventBus for Dispatcher {
    fn publish(&self, channel: &str, event: QueueEvent) -> Result<(), PublishError> {
        if !matches!(channels::classify(channel), Some(ChannelKind::Owner(_))) {
            return Err(PublishError::InvalidChannel(channel.to_string()));
        }
        info!("publish {} on {}", event.name(), channel);
        self.send(
            GatewayEvent::Queue {
                channel: channel.to_string(),
                event,
            },
            Target::Subscribers,
        );
        Ok(())
    }
}

/// New `<u32>.<u32>` socket id.
pub fn new_socket_id() -> String {
    let mut rng = rand::rng();
    format!("{}.{}", rng.random::<u32>(), rng.random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(ChannelSigner::new("askq", "test-secret"))
    }

    fn member(id: &str) -> Member {
        Member { user_id: id.into(), user_info: json!({}) }
    }

    fn drain(rx: &mut broadcast::Receiver<Envelope>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(env) = rx.try_recv() {
            out.push(env);
        }
        out
    }

    #[tokio::test]
    async fn owner_channels_are_open() {
        let d = dispatcher();
        assert_eq!(d.authorize("1.1", "user-7a1b9f0e-34c1-4f2e-9a55-6c1f0b6f1d2a", None, None), Ok(None));
        assert_eq!(d.authorize("1.1", "lobby", None, None), Err(SubscribeError::UnknownChannel));
    }

    #[tokio::test]
    async fn presence_channels_need_signed_channel_data() {
        let d = dispatcher();
        let channel = "presence-user-x";
        let data = r#"{"user_id":"viewer-1","user_info":{}}"#;

        assert_eq!(d.authorize("1.1", channel, None, Some(data)), Err(SubscribeError::MissingAuth));

        let auth = d.signer().sign_channel("1.1", channel, Some(data));
        assert_eq!(d.authorize("1.1", channel, Some(&auth), Some(data)), Ok(Some(member("viewer-1"))));
        assert_eq!(
            d.authorize("2.2", channel, Some(&auth), Some(data)),
            Err(SubscribeError::InvalidSignature)
        );

        let empty = r#"{"user_id":""}"#;
        let auth = d.signer().sign_channel("1.1", channel, Some(empty));
        assert_eq!(
            d.authorize("1.1", channel, Some(&auth), Some(empty)),
            Err(SubscribeError::InvalidChannelData)
        );
    }

    #[tokio::test]
    async fn joining_sends_roster_to_joiner_and_addition_to_others() {
        let d = dispatcher();
        let mut rx = d.subscribe();

        d.presence_join("presence-user-x", "1.1", member("a")).await;
        d.presence_join("presence-user-x", "2.2", member("b")).await;

        let frames = drain(&mut rx);
        let last = frames.last().unwrap();
        assert_eq!(last.target, Target::Socket("2.2".into()));
        match &last.event {
            GatewayEvent::Presence { event: PresenceEvent::SubscriptionSucceeded { members }, .. } => {
                assert_eq!(members, &vec![member("a"), member("b")]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let added: Vec<_> = frames
            .iter()
            .filter(|e| matches!(e.event, GatewayEvent::Presence { event: PresenceEvent::MemberAdded(_), .. }))
            .collect();
        assert_eq!(added.len(), 2);
        assert_eq!(added[1].target, Target::SubscribersExcept("2.2".into()));
    }

    #[tokio::test]
    async fn members_are_unique_across_sockets() {
        let d = dispatcher();
        d.presence_join("presence-user-x", "1.1", member("a")).await;
        let mut rx = d.subscribe();
        d.presence_join("presence-user-x", "1.2", member("a")).await;

        assert_eq!(d.members("presence-user-x").await.len(), 1);
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1, "only the roster for the second socket");

        d.presence_leave("presence-user-x", "1.1").await;
        assert!(drain(&mut rx).is_empty(), "member still connected through 1.2");

        let subs: HashSet<String> = ["presence-user-x".to_string()].into();
        d.socket_closed("1.2", &subs).await;
        let frames = drain(&mut rx);
        assert!(matches!(
            &frames[0].event,
            GatewayEvent::Presence { event: PresenceEvent::MemberRemoved(m), .. } if m.user_id == "a"
        ));
        assert!(d.members("presence-user-x").await.is_empty());
    }

    #[tokio::test]
    async fn closing_a_socket_removes_every_member_it_carried() {
        let d = dispatcher();
        let channel = "presence-user-x";
        d.presence_join(channel, "1.1", member("a")).await;
        d.presence_join(channel, "1.1", member("b")).await;
        d.presence_join(channel, "2.2", member("c")).await;
        let mut rx = d.subscribe();

        let subs: HashSet<String> = [channel.to_string()].into();
        d.socket_closed("1.1", &subs).await;

        assert_eq!(d.members(channel).await, vec![member("c")]);
        let removed: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|env| match env.event {
                GatewayEvent::Presence { event: PresenceEvent::MemberRemoved(m), .. } => Some(m.user_id),
                _ => None,
            })
            .collect();
        assert_eq!(removed, vec!["a".to_string(), "b".to_string()]);

        d.socket_closed("2.2", &subs).await;
        assert!(d.members(channel).await.is_empty());
    }

    #[tokio::test]
    async fn publish_reaches_only_subscribers_of_the_channel() {
        let d = dispatcher();
        let mut rx = d.subscribe();
        let channel = "user-7a1b9f0e-34c1-4f2e-9a55-6c1f0b6f1d2a";

        d.publish(channel, QueueEvent::NewQuestion {}).unwrap();
        assert!(d.publish("presence-user-x", QueueEvent::NewQuestion {}).is_err());

        let env = rx.try_recv().unwrap();
        let subscribed: HashSet<String> = [channel.to_string()].into();
        assert!(env.is_for("1.1", &subscribed));
        assert!(!env.is_for("1.1", &HashSet::new()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn socket_ids_have_the_signed_shape() {
        assert!(askq_crypto::channel_auth::is_valid_socket_id(&new_socket_id()));
    }
}
