use anyhow::Result;
use tracing::debug;

use crate::protocol::{CallSignalPayload, Envelope};
use crate::server::RelayServer;

impl RelayServer {
    /// `webrtc_offer` / `webrtc_answer` / `webrtc_ice_candidate`: opaque
    /// forwarding keyed by target user id. The relay never interprets the
    /// signaling body; negotiation happens entirely between the clients.
    /// Concurrent offers to the same pair are neither rejected nor
    /// coalesced; the receiving client picks the winner.
    pub fn handle_call_signal(
        &self,
        uid: &str,
        event: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let Ok(payload) = serde_json::from_value::<CallSignalPayload>(data) else {
            debug!("Malformed {} from {}", event, uid);
            return Ok(());
        };
        let mut body = payload.body;
        body.insert("from".to_string(), serde_json::Value::String(uid.to_string()));
        let outbound = Envelope::new(event, serde_json::Value::Object(body));
        self.send_to_user(&payload.to, &outbound)?;
        Ok(())
    }
}
