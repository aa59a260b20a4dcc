use anyhow::Result;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::error::Reject;
use crate::protocol::Envelope;
use crate::server::RelayServer;

impl RelayServer {
    /// Dispatches one inbound frame. Anything that goes wrong inside a
    /// handler degrades to an `error` event on the offending connection;
    /// this function only fails on transport-level problems.
    pub async fn handle_incoming(&self, message: Message, client_id: &str) -> Result<()> {
        let text = match message {
            Message::Text(text) => text,
            // tungstenite answers pings itself; everything else is noise.
            _ => return Ok(()),
        };
        debug!("📨 Received from {}: {}", client_id, text);

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(env) => env,
            Err(_) => {
                self.send_envelope(client_id, &Reject::InvalidJson.envelope())?;
                return Ok(());
            }
        };

        if envelope.event == "join" {
            return self.handle_join(client_id, &envelope.data).await;
        }

        // Every other event requires a bound identity.
        let Some(uid) = self.bound_uid(client_id) else {
            self.send_envelope(client_id, &Reject::NotAuthenticated.envelope())?;
            return Ok(());
        };

        match envelope.event.as_str() {
            "send_message" => self.handle_send_message(client_id, &uid, envelope.data).await,
            "user_typing" | "user_typing_stop" => {
                self.handle_typing(&uid, &envelope.event, envelope.data)
            }
            "join_group" => self.handle_join_group(client_id, &uid, envelope.data).await,
            "send_group_msg" => self.handle_send_group_msg(client_id, &uid, envelope.data).await,
            "group_typing" | "group_typing_stop" => {
                self.handle_group_typing(client_id, &uid, &envelope.event, envelope.data)
            }
            "webrtc_offer" | "webrtc_answer" | "webrtc_ice_candidate" => {
                self.handle_call_signal(&uid, &envelope.event, envelope.data)
            }
            other => {
                debug!("Unknown event {} from {}", other, client_id);
                Ok(())
            }
        }
    }

    /// Decodes a typed payload or reports the failure to the client.
    pub(crate) fn decode_payload<T: serde::de::DeserializeOwned>(
        &self,
        client_id: &str,
        data: serde_json::Value,
    ) -> Result<Option<T>> {
        match serde_json::from_value(data) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                debug!("Malformed payload from {}: {}", client_id, e);
                self.send_envelope(client_id, &Reject::InvalidPayload.envelope())?;
                Ok(None)
            }
        }
    }
}
