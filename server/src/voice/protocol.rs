//! Signaling wire messages.
//!
//! Inbound frames are free-form JSON objects tagged on a `type` field.
//! The reserved types get their own variants; everything else (SDP
//! offers, ICE candidates, app-defined control) passes through opaquely
//! so clients can extend the protocol without server changes.

use serde::Serialize;
use serde_json::{Map, Value};

pub const MSG_ROOM_INFO: &str = "room-info";
pub const MSG_SCREENSHARE_START: &str = "screenshare-start";
pub const MSG_SCREENSHARE_STOP: &str = "screenshare-stop";

/// One parsed inbound frame from a room member.
#[derive(Debug)]
pub enum ClientFrame {
    /// Poll for a fresh room snapshot; no state mutation.
    RoomInfo,
    ScreenShareStart,
    ScreenShareStop,
    /// Unrecognized signaling payload, relayed verbatim (plus a `from`
    /// stamp). A `to` member id requests unicast.
    Signal(Map<String, Value>),
}

impl ClientFrame {
    /// `None` for frames that are not JSON objects; those are dropped.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let Value::Object(map) = value else {
            return None;
        };
        match map.get("type").and_then(Value::as_str) {
            Some(MSG_ROOM_INFO) => Some(Self::RoomInfo),
            Some(MSG_SCREENSHARE_START) => Some(Self::ScreenShareStart),
            Some(MSG_SCREENSHARE_STOP) => Some(Self::ScreenShareStop),
            _ => Some(Self::Signal(map)),
        }
    }
}

/// One member entry in a room snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RoomUser {
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Empty when the user directory has no entry.
    pub username: String,
}

/// Server-originated room events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "room-info")]
    RoomInfo {
        #[serde(rename = "userCount")]
        user_count: usize,
        users: Vec<RoomUser>,
        #[serde(rename = "canJoin")]
        can_join: bool,
        /// Empty string when nobody is presenting.
        #[serde(rename = "presenterId")]
        presenter_id: String,
    },
    #[serde(rename = "error")]
    Error { error: String },
    #[serde(rename = "user-joined")]
    UserJoined {
        #[serde(rename = "userId")]
        user_id: String,
        username: String,
    },
    #[serde(rename = "user-left")]
    UserLeft {
        #[serde(rename = "userId")]
        user_id: String,
    },
    #[serde(rename = "screen-state")]
    ScreenState {
        #[serde(rename = "presenterId")]
        presenter_id: String,
        active: bool,
    },
}

impl ServerEvent {
    pub fn error(err: &crate::voice::RoomError) -> Self {
        Self::Error {
            error: err.to_string(),
        }
    }

    /// Wire form. These enums always serialize; an empty string is
    /// returned on the unreachable failure path.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Stamp the relay metadata onto a passthrough signal and serialize it.
pub fn stamp_from(mut signal: Map<String, Value>, from: &str) -> String {
    signal.insert("from".to_string(), Value::String(from.to_string()));
    Value::Object(signal).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::RoomError;
    use serde_json::json;

    #[test]
    fn reserved_types_parse_to_their_variants() {
        assert!(matches!(
            ClientFrame::parse(r#"{"type":"room-info"}"#),
            Some(ClientFrame::RoomInfo)
        ));
        assert!(matches!(
            ClientFrame::parse(r#"{"type":"screenshare-start"}"#),
            Some(ClientFrame::ScreenShareStart)
        ));
        assert!(matches!(
            ClientFrame::parse(r#"{"type":"screenshare-stop"}"#),
            Some(ClientFrame::ScreenShareStop)
        ));
    }

    #[test]
    fn unknown_types_pass_through_with_fields_intact() {
        let frame = ClientFrame::parse(r#"{"type":"ice-candidate","candidate":"c","to":"bob"}"#);
        let Some(ClientFrame::Signal(map)) = frame else {
            panic!("expected passthrough signal");
        };
        assert_eq!(map["candidate"], "c");
        assert_eq!(map["to"], "bob");

        let text = stamp_from(map, "alice");
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["from"], "alice");
        assert_eq!(value["candidate"], "c");
    }

    #[test]
    fn non_object_frames_are_dropped() {
        assert!(ClientFrame::parse("not json").is_none());
        assert!(ClientFrame::parse(r#"["array"]"#).is_none());
        assert!(ClientFrame::parse(r#""text""#).is_none());
    }

    #[test]
    fn server_event_wire_shapes() {
        let event = ServerEvent::RoomInfo {
            user_count: 2,
            users: vec![RoomUser {
                user_id: "alice".into(),
                username: "Alice".into(),
            }],
            can_join: false,
            presenter_id: String::new(),
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["type"], "room-info");
        assert_eq!(value["userCount"], 2);
        assert_eq!(value["users"][0]["userId"], "alice");
        assert_eq!(value["canJoin"], false);
        assert_eq!(value["presenterId"], "");

        let value: serde_json::Value =
            serde_json::from_str(&ServerEvent::error(&RoomError::RoomNotFound).to_json()).unwrap();
        assert_eq!(value, json!({"type": "error", "error": "Voice room not found"}));

        let event = ServerEvent::ScreenState {
            presenter_id: "alice".into(),
            active: true,
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["type"], "screen-state");
        assert_eq!(value["presenterId"], "alice");
        assert_eq!(value["active"], true);

        let value: serde_json::Value = serde_json::from_str(
            &ServerEvent::UserLeft {
                user_id: "carol".into(),
            }
            .to_json(),
        )
        .unwrap();
        assert_eq!(value, json!({"type": "user-left", "userId": "carol"}));
    }
}
