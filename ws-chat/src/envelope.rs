//! JSON envelopes exchanged with the chat server.
//!
//! Outbound envelopes are a serde-tagged enum. Inbound frames are parsed
//! leniently into [`Inbound`]: anything that is not an object with a known
//! `type` collapses into [`Inbound::Unrecognized`] and is dropped by dispatch.

use std::{fmt, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::socket::CloseInfo;

/// Categories a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Close,
    Error,
    Joined,
    Message,
    Read,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Open,
        EventKind::Close,
        EventKind::Error,
        EventKind::Joined,
        EventKind::Message,
        EventKind::Read,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::Close => "close",
            EventKind::Error => "error",
            EventKind::Joined => "joined",
            EventKind::Message => "message",
            EventKind::Read => "read",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event kind '{0}'")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| UnknownEventKind(name.to_string()))
    }
}

/// Envelopes the client sends.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    #[serde(rename_all = "camelCase")]
    Join { thread_id: String, self_id: String },
    #[serde(rename_all = "camelCase")]
    Leave { thread_id: String },
    #[serde(rename_all = "camelCase")]
    Message {
        thread_id: String,
        user_id: String,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Read {
        thread_id: String,
        user_id: String,
        at: String,
    },
}

impl Outbound {
    pub fn type_name(&self) -> &'static str {
        match self {
            Outbound::Join { .. } => "join",
            Outbound::Leave { .. } => "leave",
            Outbound::Message { .. } => "message",
            Outbound::Read { .. } => "read",
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// ISO-8601 in UTC with millisecond precision, e.g. `2026-10-19T08:15:30.123Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// An inbound frame after discrimination on `type`.
///
/// The payload is kept verbatim; listeners decide how much of it they read.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Joined(Value),
    Message(Value),
    Read(Value),
    Unrecognized,
}

impl Inbound {
    pub fn parse(raw: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(raw) else {
            return Inbound::Unrecognized;
        };
        let kind = value
            .as_object()
            .and_then(|object| object.get("type"))
            .and_then(Value::as_str);

        match kind {
            Some("joined") => Inbound::Joined(value),
            Some("message") => Inbound::Message(value),
            Some("read") => Inbound::Read(value),
            _ => Inbound::Unrecognized,
        }
    }

    pub fn into_event(self) -> Option<ChatEvent> {
        match self {
            Inbound::Joined(value) => Some(ChatEvent::Joined(value)),
            Inbound::Message(value) => Some(ChatEvent::Message(value)),
            Inbound::Read(value) => Some(ChatEvent::Read(value)),
            Inbound::Unrecognized => None,
        }
    }
}

/// What a listener receives.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Open,
    Close(CloseInfo),
    Error(String),
    Joined(Value),
    Message(Value),
    Read(Value),
}

impl ChatEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChatEvent::Open => EventKind::Open,
            ChatEvent::Close(_) => EventKind::Close,
            ChatEvent::Error(_) => EventKind::Error,
            ChatEvent::Joined(_) => EventKind::Joined,
            ChatEvent::Message(_) => EventKind::Message,
            ChatEvent::Read(_) => EventKind::Read,
        }
    }

    /// The parsed envelope for inbound kinds.
    pub fn envelope(&self) -> Option<&Value> {
        match self {
            ChatEvent::Joined(value) | ChatEvent::Message(value) | ChatEvent::Read(value) => {
                Some(value)
            }
            ChatEvent::Open | ChatEvent::Close(_) | ChatEvent::Error(_) => None,
        }
    }

    /// Deserializes the envelope into a typed view, if it has the expected shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        self.envelope()
            .and_then(|value| T::deserialize(value).ok())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub thread_id: String,
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub thread_id: String,
    pub user_id: String,
    pub at: String,
}

/// Server notice that someone entered a thread. Both fields are optional on the wire.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantJoined {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn outbound_shapes_match_wire_contract() {
        let join = Outbound::Join {
            thread_id: "thread-1".into(),
            self_id: "user-42".into(),
        };
        let leave = Outbound::Leave {
            thread_id: "thread-1".into(),
        };
        let message = Outbound::Message {
            thread_id: "thread-1".into(),
            user_id: "user-42".into(),
            text: "hi".into(),
        };
        let read = Outbound::Read {
            thread_id: "thread-1".into(),
            user_id: "user-42".into(),
            at: "2026-10-19T08:15:30.123Z".into(),
        };

        let as_value = |envelope: &Outbound| -> Value {
            serde_json::from_str(&envelope.encode().expect("encode")).expect("valid json")
        };

        assert_eq!(
            as_value(&join),
            json!({"type": "join", "threadId": "thread-1", "selfId": "user-42"})
        );
        assert_eq!(
            as_value(&leave),
            json!({"type": "leave", "threadId": "thread-1"})
        );
        assert_eq!(
            as_value(&message),
            json!({"type": "message", "threadId": "thread-1", "userId": "user-42", "text": "hi"})
        );
        assert_eq!(
            as_value(&read),
            json!({"type": "read", "threadId": "thread-1", "userId": "user-42", "at": "2026-10-19T08:15:30.123Z"})
        );
    }

    #[test]
    fn timestamps_use_millis_and_zulu_suffix() {
        let at = Utc
            .with_ymd_and_hms(2026, 10, 19, 8, 15, 30)
            .single()
            .expect("valid date");
        assert_eq!(format_timestamp(at), "2026-10-19T08:15:30.000Z");
    }

    #[test]
    fn known_inbound_kinds_keep_payload_verbatim() {
        let raw = r#"{"type":"message","threadId":"thread-1","userId":"user-7","text":"hi","extra":[1,2]}"#;
        let expected: Value = serde_json::from_str(raw).expect("valid json");
        assert_eq!(Inbound::parse(raw), Inbound::Message(expected));

        assert!(matches!(
            Inbound::parse(r#"{"type":"joined","userId":"user-7"}"#),
            Inbound::Joined(_)
        ));
        assert!(matches!(
            Inbound::parse(r#"{"type":"read","threadId":"t","userId":"u","at":"x"}"#),
            Inbound::Read(_)
        ));
    }

    #[test]
    fn malformed_or_unknown_frames_are_unrecognized() {
        for raw in [
            "",
            "not json",
            "{\"type\":",
            "[1,2,3]",
            "\"message\"",
            "42",
            "null",
            "{}",
            r#"{"type":42}"#,
            r#"{"type":"mystery"}"#,
            r#"{"type":"open"}"#,
            r#"{"kind":"message"}"#,
        ] {
            assert_eq!(Inbound::parse(raw), Inbound::Unrecognized, "frame {raw:?}");
            assert_eq!(Inbound::parse(raw).into_event(), None);
        }
    }

    #[test]
    fn event_kind_names_round_trip_through_from_str() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert_eq!(
            "typing".parse::<EventKind>(),
            Err(UnknownEventKind("typing".into()))
        );
    }

    #[test]
    fn decode_reads_typed_views() {
        let event = ChatEvent::Message(json!({
            "type": "message",
            "threadId": "thread-1",
            "userId": "user-7",
            "text": "hi"
        }));
        assert_eq!(
            event.decode::<ChatMessage>(),
            Some(ChatMessage {
                thread_id: "thread-1".into(),
                user_id: "user-7".into(),
                text: "hi".into(),
            })
        );
        assert_eq!(event.decode::<ReadReceipt>(), None);

        let joined = ChatEvent::Joined(json!({"type": "joined", "userId": "user-7"}));
        assert_eq!(
            joined.decode::<ParticipantJoined>(),
            Some(ParticipantJoined {
                thread_id: None,
                user_id: Some("user-7".into()),
            })
        );

        assert_eq!(ChatEvent::Open.decode::<ParticipantJoined>(), None);
    }
}
