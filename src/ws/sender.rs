use anyhow::Result;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::protocol::Envelope;
use crate::server::RelayServer;

impl RelayServer {
    pub fn send_to_client(&self, client_id: &str, message: Message) -> Result<()> {
        if let Some(connection) = self.connections.get(client_id) {
            connection
                .sender
                .send(message)
                .map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;
            debug!("📤 Sent frame to client {}", client_id);
            Ok(())
        } else {
            warn!("⚠️  Client {} not found for delivery", client_id);
            Err(anyhow::anyhow!("Client {} not found", client_id))
        }
    }

    pub fn send_envelope(&self, client_id: &str, envelope: &Envelope) -> Result<()> {
        self.send_to_client(client_id, envelope.to_message()?)
    }

    /// Forwards to the connection currently registered for `user_id`.
    /// A lookup miss is absorbed, not an error; so is a registered handle
    /// whose channel already died. Returns whether delivery happened.
    pub fn send_to_user(&self, user_id: &str, envelope: &Envelope) -> Result<bool> {
        match self.presence.lookup(user_id) {
            Some(client_id) => {
                if self.send_to_client(&client_id, envelope.to_message()?).is_err() {
                    debug!("Dropping {} for {}: connection gone", envelope.event, user_id);
                    return Ok(false);
                }
                Ok(true)
            }
            None => {
                debug!("User {} not registered, dropping {}", user_id, envelope.event);
                Ok(false)
            }
        }
    }

    /// Broadcasts to every client in a room, pruning dead senders.
    /// `exclude` skips one client id (typing indicators skip the sender).
    pub fn broadcast_room(
        &self,
        group_id: &str,
        envelope: &Envelope,
        exclude: Option<&str>,
    ) -> Result<usize> {
        let message = envelope.to_message()?;
        let Some(members) = self.rooms.get(group_id) else {
            return Ok(0);
        };
        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in members.iter() {
            let client_id = entry.key();
            if exclude == Some(client_id.as_str()) {
                continue;
            }
            match self.connections.get(client_id) {
                Some(conn) if conn.sender.send(message.clone()).is_ok() => delivered += 1,
                _ => dead.push(client_id.clone()),
            }
        }
        drop(members);
        for client_id in dead {
            if let Some(room) = self.rooms.get(group_id) {
                room.remove(&client_id);
            }
        }
        Ok(delivered)
    }
}
