use serde::{Deserialize, Serialize};

/// Events published on an owner's `user-<ownerId>` channel.
///
/// `new-question` and `question-unpinned` carry nothing: subscribers with an
/// authenticated query path refetch instead. `question-pinned` carries the body
/// because the overlay has no query path at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload", rename_all = "kebab-case")]
pub enum QueueEvent {
    NewQuestion {},
    QuestionPinned {
        question: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
    },
    QuestionUnpinned {},
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewQuestion {} => "new-question",
            Self::QuestionPinned { .. } => "question-pinned",
            Self::QuestionUnpinned {} => "question-unpinned",
        }
    }
}

/// A member of a presence channel, as presented in the signed `channel_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: String,
    #[serde(default)]
    pub user_info: serde_json::Value,
}

/// Membership notifications on a `presence-*` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload", rename_all = "snake_case")]
pub enum PresenceEvent {
    /// Full roster at subscription time, including the subscriber itself.
    SubscriptionSucceeded { members: Vec<Member> },
    MemberAdded(Member),
    MemberRemoved(Member),
}

/// Frames sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// First frame on every connection; the socket id is what channel auth signs.
    Ready { socket_id: String },

    /// Subscription to a non-presence channel is live. Presence channels
    /// acknowledge with `subscription_succeeded` instead.
    Subscribed { channel: String },

    Queue { channel: String, event: QueueEvent },

    Presence { channel: String, event: PresenceEvent },

    SubscriptionError { channel: String, reason: String },
}

impl GatewayEvent {
    /// Channel this frame belongs to; `Ready` is connection-scoped.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::Ready { .. } => None,
            Self::Subscribed { channel }
            | Self::Queue { channel, .. }
            | Self::Presence { channel, .. }
            | Self::SubscriptionError { channel, .. } => Some(channel),
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    Subscribe {
        channel: String,
        #[serde(default)]
        auth: Option<String>,
        /// JSON-encoded [`Member`], required for presence channels.
        #[serde(default)]
        channel_data: Option<String>,
    },

    Unsubscribe { channel: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn queue_events_use_platform_event_names() {
        let pinned = QueueEvent::QuestionPinned {
            question: "How do magnets work?".into(),
            author: None,
        };
        assert_eq!(
            serde_json::to_value(&pinned).unwrap(),
            json!({ "name": "question-pinned", "payload": { "question": "How do magnets work?" } })
        );
        assert_eq!(
            serde_json::to_value(QueueEvent::NewQuestion {}).unwrap(),
            json!({ "name": "new-question", "payload": {} })
        );
        assert_eq!(QueueEvent::QuestionUnpinned {}.name(), "question-unpinned");
    }

    #[test]
    fn subscribe_command_accepts_missing_auth() {
        let cmd: GatewayCommand = serde_json::from_value(json!({
            "type": "Subscribe",
            "data": { "channel": "user-1" }
        }))
        .unwrap();
        assert_eq!(
            cmd,
            GatewayCommand::Subscribe { channel: "user-1".into(), auth: None, channel_data: None }
        );
    }

    #[test]
    fn presence_frames_name_their_channel() {
        let frame = GatewayEvent::Presence {
            channel: "presence-user-1".into(),
            event: PresenceEvent::MemberAdded(Member { user_id: "abc".into(), user_info: json!(null) }),
        };
        let text = serde_json::to_string(&frame).unwrap();
        let back: GatewayEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back.channel(), Some("presence-user-1"));
        assert_eq!(back, frame);
    }
}
