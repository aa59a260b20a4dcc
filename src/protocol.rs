use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

/// Wire envelope carried on every frame in both directions.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(event: &str, data: serde_json::Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    pub fn error(message: &str) -> Self {
        Self::new("error", serde_json::json!({ "message": message }))
    }

    pub fn to_message(&self) -> Result<Message> {
        Ok(Message::Text(serde_json::to_string(self)?))
    }
}

/// `send_message` request payload.
#[derive(Deserialize, Debug)]
pub struct SendMessagePayload {
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub text: String,
}

/// `join_group` request payload.
#[derive(Deserialize, Debug)]
pub struct JoinGroupPayload {
    #[serde(rename = "groupId")]
    pub group_id: String,
}

/// `send_group_msg` request payload.
#[derive(Deserialize, Debug)]
pub struct SendGroupMsgPayload {
    #[serde(rename = "groupId")]
    pub group_id: String,
    pub text: String,
}

/// `user_typing` / `user_typing_stop` request payload.
#[derive(Deserialize, Debug)]
pub struct TypingPayload {
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub to: String,
}

/// `group_typing` / `group_typing_stop` request payload.
#[derive(Deserialize, Debug)]
pub struct GroupTypingPayload {
    #[serde(rename = "groupId")]
    pub group_id: String,
}

/// `webrtc_offer` / `webrtc_answer` / `webrtc_ice_candidate` request payload.
/// The signaling body (offer/answer/candidate) is opaque to the relay.
#[derive(Deserialize, Debug)]
pub struct CallSignalPayload {
    pub to: String,
    #[serde(flatten)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

/// Sender block embedded in `receive_message`.
#[derive(Serialize, Deserialize, Debug)]
pub struct MessageSender {
    pub id: String,
    pub name: String,
    #[serde(rename = "profilePic", skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

/// `receive_message` event payload (echo and forward share the shape).
#[derive(Serialize, Deserialize, Debug)]
pub struct ReceiveMessage {
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub from: MessageSender,
}

/// `group_message` event payload.
#[derive(Serialize, Deserialize, Debug)]
pub struct GroupMessage {
    #[serde(rename = "groupId")]
    pub group_id: String,
    pub text: String,
    pub sender: GroupSender,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GroupSender {
    pub id: String,
    pub name: String,
}

/// `friend_status_update` event payload.
#[derive(Serialize, Deserialize, Debug)]
pub struct FriendStatusUpdate {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_event_name() {
        let env = Envelope::new("send_message", serde_json::json!({"chatId": "c1", "text": "hi"}));
        let text = serde_json::to_string(&env).unwrap();
        assert!(text.contains("\"type\":\"send_message\""));
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back.event, "send_message");
        let payload: SendMessagePayload = serde_json::from_value(back.data).unwrap();
        assert_eq!(payload.chat_id, "c1");
        assert_eq!(payload.text, "hi");
    }

    #[test]
    fn signal_payload_keeps_opaque_body() {
        let env: Envelope = serde_json::from_str(
            r#"{"type":"webrtc_offer","data":{"to":"u2","offer":{"sdp":"v=0"}}}"#,
        )
        .unwrap();
        let payload: CallSignalPayload = serde_json::from_value(env.data).unwrap();
        assert_eq!(payload.to, "u2");
        assert_eq!(payload.body["offer"]["sdp"], "v=0");
    }

    #[test]
    fn join_data_may_be_bare_token() {
        let env: Envelope = serde_json::from_str(r#"{"type":"join","data":"tok123"}"#).unwrap();
        assert_eq!(env.data.as_str(), Some("tok123"));
    }
}
