use classpulse_models::ServerEventKind;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Teacher,
    Student,
}

/// One outbound event. Payloads are JSON values so teacher and student
/// channels can share the envelope while receiving different shapes.
#[derive(Debug, Clone)]
pub struct HubEvent {
    pub kind: ServerEventKind,
    pub payload: serde_json::Value,
}

/// Who an event is addressed to.
#[derive(Debug, Clone)]
enum Audience {
    All,
    Role(Role),
    Channel(String),
    Session(String),
}

#[derive(Clone)]
struct ChannelSubscription {
    role: Role,
    /// Present for student channels only.
    session_id: Option<String>,
    sender: broadcast::Sender<HubEvent>,
}

/// Broadcast-based event bus for real-time fan-out. Delivery is best-effort:
/// a lagging or closed receiver drops events rather than blocking the sender,
/// and reconnecting clients pull a fresh snapshot instead.
#[derive(Clone)]
pub struct EventBus {
    capacity: usize,
    channels: Arc<RwLock<HashMap<String, ChannelSubscription>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register_channel(
        &self,
        channel_id: impl Into<String>,
        role: Role,
        session_id: Option<String>,
    ) -> broadcast::Receiver<HubEvent> {
        let (sender, receiver) = broadcast::channel(self.capacity.max(16));
        let subscription = ChannelSubscription {
            role,
            session_id,
            sender,
        };

        let mut channels = match self.channels.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels.insert(channel_id.into(), subscription);
        receiver
    }

    pub fn unregister_channel(&self, channel_id: &str) {
        let mut channels = match self.channels.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels.remove(channel_id);
    }

    fn publish(&self, audience: Audience, event: HubEvent) {
        let senders: Vec<broadcast::Sender<HubEvent>> = {
            let channels = match self.channels.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            channels
                .iter()
                .filter(|(id, sub)| match &audience {
                    Audience::All => true,
                    Audience::Role(role) => sub.role == *role,
                    Audience::Channel(target) => *id == target,
                    Audience::Session(target) => sub.session_id.as_deref() == Some(target),
                })
                .map(|(_, sub)| sub.sender.clone())
                .collect()
        };

        for sender in senders {
            let _ = sender.send(event.clone());
        }
    }

    pub fn publish_all(&self, kind: ServerEventKind, payload: serde_json::Value) {
        self.publish(Audience::All, HubEvent { kind, payload });
    }

    /// Address every channel registered with the given role.
    pub fn publish_role(&self, role: Role, kind: ServerEventKind, payload: serde_json::Value) {
        self.publish(Audience::Role(role), HubEvent { kind, payload });
    }

    pub fn publish_channel(
        &self,
        channel_id: &str,
        kind: ServerEventKind,
        payload: serde_json::Value,
    ) {
        self.publish(
            Audience::Channel(channel_id.to_string()),
            HubEvent { kind, payload },
        );
    }

    pub fn publish_session(
        &self,
        session_id: &str,
        kind: ServerEventKind,
        payload: serde_json::Value,
    ) {
        self.publish(
            Audience::Session(session_id.to_string()),
            HubEvent { kind, payload },
        );
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_addressing_reaches_only_the_target() {
        let bus = EventBus::default();
        let mut teacher_rx = bus.register_channel("ch-t", Role::Teacher, None);
        let mut student_rx = bus.register_channel("ch-s", Role::Student, Some("s1".into()));

        bus.publish_channel("ch-s", ServerEventKind::VoteAccepted, json!({"ok": true}));

        let event = student_rx.try_recv().expect("student receives");
        assert_eq!(event.kind, ServerEventKind::VoteAccepted);
        assert!(teacher_rx.try_recv().is_err());
    }

    #[test]
    fn broadcast_reaches_every_registered_channel() {
        let bus = EventBus::default();
        let mut teacher_rx = bus.register_channel("ch-t", Role::Teacher, None);
        let mut student_rx = bus.register_channel("ch-s", Role::Student, Some("s1".into()));

        bus.publish_all(ServerEventKind::LiveCountUpdate, json!({"count": 1}));

        assert!(teacher_rx.try_recv().is_ok());
        assert!(student_rx.try_recv().is_ok());
    }

    #[test]
    fn role_addressing_reaches_the_whole_group() {
        let bus = EventBus::default();
        let mut teacher_rx = bus.register_channel("ch-t", Role::Teacher, None);
        let mut s1_rx = bus.register_channel("ch-s1", Role::Student, Some("s1".into()));
        let mut s2_rx = bus.register_channel("ch-s2", Role::Student, Some("s2".into()));

        bus.publish_role(Role::Student, ServerEventKind::PollEnded, json!({}));

        assert!(s1_rx.try_recv().is_ok());
        assert!(s2_rx.try_recv().is_ok());
        assert!(teacher_rx.try_recv().is_err());
    }

    #[test]
    fn unregistered_channels_stop_receiving() {
        let bus = EventBus::default();
        let mut rx = bus.register_channel("ch-1", Role::Student, Some("s1".into()));
        bus.unregister_channel("ch-1");

        bus.publish_all(ServerEventKind::TallyUpdate, json!({}));
        // The sender side was dropped with the subscription.
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn session_addressing_reaches_every_channel_of_that_session() {
        let bus = EventBus::default();
        let mut rx1 = bus.register_channel("ch-1", Role::Student, Some("s1".into()));
        let mut rx2 = bus.register_channel("ch-2", Role::Student, Some("s2".into()));

        bus.publish_session("s1", ServerEventKind::VoteAccepted, json!({}));

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }
}
