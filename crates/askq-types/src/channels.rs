use uuid::Uuid;

const OWNER_PREFIX: &str = "user-";
const PRESENCE_PREFIX: &str = "presence-";
const PRIVATE_PREFIX: &str = "private-";

/// Kind of a real-time channel, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// `user-<ownerId>`: open to anyone, carries queue events.
    Owner(Uuid),
    /// `presence-...`: signed subscription, reports membership.
    Presence,
    /// `private-...`: signed subscription.
    Private,
}

/// The owner's queue channel, e.g. `user-<ownerId>`.
pub fn owner_channel(owner_id: Uuid) -> String {
    format!("{OWNER_PREFIX}{owner_id}")
}

/// The presence variant of the owner's channel, e.g. `presence-user-<ownerId>`.
pub fn presence_channel(owner_id: Uuid) -> String {
    format!("{PRESENCE_PREFIX}{OWNER_PREFIX}{owner_id}")
}

pub fn classify(channel: &str) -> Option<ChannelKind> {
    if let Some(rest) = channel.strip_prefix(OWNER_PREFIX) {
        return rest.parse().ok().map(ChannelKind::Owner);
    }
    if channel.len() > PRESENCE_PREFIX.len() && channel.starts_with(PRESENCE_PREFIX) {
        return Some(ChannelKind::Presence);
    }
    if channel.len() > PRIVATE_PREFIX.len() && channel.starts_with(PRIVATE_PREFIX) {
        return Some(ChannelKind::Private);
    }
    None
}
