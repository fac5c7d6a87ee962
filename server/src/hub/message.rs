//! Chat envelope delivered through the generic hub.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope discriminator, serialized as `direct_message` / `team_broadcast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    DirectMessage,
    TeamBroadcast,
}

/// Tagged envelope `{type, payload}`. The payload is opaque to the hub:
/// validation and persistence happen in the caller before fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub payload: Value,
}

impl ChatMessage {
    pub fn direct(payload: Value) -> Self {
        Self {
            kind: ChatKind::DirectMessage,
            payload,
        }
    }

    pub fn team(payload: Value) -> Self {
        Self {
            kind: ChatKind::TeamBroadcast,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_wire_format() {
        let msg = ChatMessage::direct(json!({"receiverId": "bob", "body": "hi"}));
        let text = serde_json::to_string(&msg).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "direct_message");
        assert_eq!(value["payload"]["receiverId"], "bob");

        let msg = ChatMessage::team(json!({"teamId": "t1"}));
        let value: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "team_broadcast");
    }
}
