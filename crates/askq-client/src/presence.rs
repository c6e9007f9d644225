use std::collections::BTreeMap;

use askq_types::events::{GatewayEvent, Member, PresenceEvent};

use crate::subscription::ChannelSubscription;

/// Who else is looking at the dashboard, projected from a presence channel.
///
/// Only a `subscription_succeeded` roster is a full resync point. Until one
/// arrives (initially and after every [`reset`](Self::reset)) incremental
/// events are ignored, since some may have been lost while disconnected.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    self_id: String,
    members: Option<BTreeMap<String, Member>>,
}

impl PresenceTracker {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self { self_id: self_id.into(), members: None }
    }

    pub fn apply(&mut self, event: &PresenceEvent) {
        match event {
            PresenceEvent::SubscriptionSucceeded { members } => {
                self.members = Some(
                    members
                        .iter()
                        .map(|m| (m.user_id.clone(), m.clone()))
                        .collect(),
                );
            }
            PresenceEvent::MemberAdded(member) => {
                if let Some(members) = &mut self.members {
                    members.insert(member.user_id.clone(), member.clone());
                }
            }
            PresenceEvent::MemberRemoved(member) => {
                if let Some(members) = &mut self.members {
                    members.remove(&member.user_id);
                }
            }
        }
    }

    /// Apply the next frame of a presence subscription. Returns `false` once the
    /// connection is gone, with the roster already forgotten.
    pub async fn follow(&mut self, subscription: &mut ChannelSubscription) -> bool {
        match subscription.next_event().await {
            Some(GatewayEvent::Presence { event, .. }) => {
                self.apply(&event);
                true
            }
            Some(_) => true,
            None => {
                self.reset();
                false
            }
        }
    }

    /// Forget everything; call when the connection drops.
    pub fn reset(&mut self) {
        self.members = None;
    }

    pub fn is_synced(&self) -> bool {
        self.members.is_some()
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().flat_map(|m| m.values())
    }

    /// Number of connected members other than this client.
    pub fn others(&self) -> usize {
        self.members()
            .filter(|m| m.user_id != self.self_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn member(id: &str) -> Member {
        Member { user_id: id.into(), user_info: json!({ "name": id }) }
    }

    fn roster(ids: &[&str]) -> PresenceEvent {
        PresenceEvent::SubscriptionSucceeded { members: ids.iter().map(|id| member(id)).collect() }
    }

    #[test]
    fn counts_others_from_the_roster() {
        let mut tracker = PresenceTracker::new("me");
        assert_eq!(tracker.others(), 0);
        assert!(!tracker.is_synced());

        tracker.apply(&roster(&["me", "a", "b"]));
        assert_eq!(tracker.others(), 2);

        tracker.apply(&PresenceEvent::MemberAdded(member("c")));
        tracker.apply(&PresenceEvent::MemberAdded(member("c")));
        assert_eq!(tracker.others(), 3);

        tracker.apply(&PresenceEvent::MemberRemoved(member("a")));
        assert_eq!(tracker.others(), 2);
        assert_eq!(tracker.members().count(), 3);
    }

    #[test]
    fn incremental_events_before_a_snapshot_are_ignored() {
        let mut tracker = PresenceTracker::new("me");
        tracker.apply(&PresenceEvent::MemberAdded(member("a")));
        assert_eq!(tracker.others(), 0);

        tracker.apply(&roster(&["me", "a"]));
        tracker.reset();
        tracker.apply(&PresenceEvent::MemberAdded(member("b")));
        assert!(!tracker.is_synced());
        assert_eq!(tracker.others(), 0);

        // A fresh snapshot replaces whatever came before it.
        tracker.apply(&roster(&["me", "b"]));
        assert_eq!(tracker.members().map(|m| m.user_id.as_str()).collect::<Vec<_>>(), vec!["b", "me"]);
    }
}
