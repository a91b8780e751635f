use serde::{Deserialize, Serialize};

/// Inbound events from a connected client channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    TeacherJoin,
    StudentJoin {
        session_id: String,
        name: String,
    },
    CreatePoll {
        question: String,
        options: Vec<String>,
        #[serde(default)]
        time_limit: Option<i64>,
    },
    SubmitVote {
        poll_id: String,
        option_id: String,
    },
}

/// Outbound event type tags. The payload shape per kind is documented on the
/// hub; payloads travel as JSON values so heterogeneous clients share one
/// envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEventKind {
    StateSnapshot,
    NewPoll,
    VoteAccepted,
    VoteRejected,
    TallyUpdate,
    PollEnded,
    LiveCountUpdate,
    Error,
}

impl ServerEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerEventKind::StateSnapshot => "state-snapshot",
            ServerEventKind::NewPoll => "new-poll",
            ServerEventKind::VoteAccepted => "vote-accepted",
            ServerEventKind::VoteRejected => "vote-rejected",
            ServerEventKind::TallyUpdate => "tally-update",
            ServerEventKind::PollEnded => "poll-ended",
            ServerEventKind::LiveCountUpdate => "live-count-update",
            ServerEventKind::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_deserialize_from_tagged_json() {
        let raw = r#"{"type":"student-join","data":{"session_id":"s1","name":"Ada"}}"#;
        let event: ClientEvent = serde_json::from_str(raw).expect("parse");
        match event {
            ClientEvent::StudentJoin { session_id, name } => {
                assert_eq!(session_id, "s1");
                assert_eq!(name, "Ada");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn create_poll_time_limit_is_optional() {
        let raw = r#"{"type":"create-poll","data":{"question":"Q?","options":["A","B"]}}"#;
        let event: ClientEvent = serde_json::from_str(raw).expect("parse");
        match event {
            ClientEvent::CreatePoll { time_limit, .. } => assert!(time_limit.is_none()),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
