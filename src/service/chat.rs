use anyhow::Result;
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::Reject;
use crate::protocol::{
    Envelope, MessageSender, ReceiveMessage, SendMessagePayload, TypingPayload,
};
use crate::server::RelayServer;
use crate::store::MessageRecord;

impl RelayServer {
    /// `send_message`: persist-then-forward for a two-party chat. The sender
    /// always gets the echo; the recipient gets the same envelope only while
    /// registered. An offline recipient is not an error; the message is in
    /// the store and comes back on the next history fetch.
    pub async fn handle_send_message(
        &self,
        client_id: &str,
        uid: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let Some(payload) = self.decode_payload::<SendMessagePayload>(client_id, data)? else {
            return Ok(());
        };

        let chat = match self.store.find_chat(&payload.chat_id).await {
            Ok(chat) => chat,
            Err(e) => {
                error!("Chat lookup failed for {}: {}", payload.chat_id, e);
                self.send_envelope(client_id, &Reject::SendFailed.envelope())?;
                return Ok(());
            }
        };
        let Some(chat) = chat else {
            self.send_envelope(client_id, &Reject::ChatNotFound.envelope())?;
            return Ok(());
        };
        if !chat.participants.iter().any(|p| p == uid) {
            self.send_envelope(client_id, &Reject::NotParticipant.envelope())?;
            return Ok(());
        }
        let Some(recipient) = chat.participants.iter().find(|p| *p != uid).cloned() else {
            self.send_envelope(client_id, &Reject::NoRecipient.envelope())?;
            return Ok(());
        };
        match self.store.is_blocked(uid, &recipient).await {
            Ok(false) => {}
            Ok(true) => {
                self.send_envelope(client_id, &Reject::Blocked.envelope())?;
                return Ok(());
            }
            Err(e) => {
                error!("Block lookup failed for chat {}: {}", payload.chat_id, e);
                self.send_envelope(client_id, &Reject::SendFailed.envelope())?;
                return Ok(());
            }
        }

        let sender_profile = match self.store.user_profile(uid).await {
            Ok(profile) => profile,
            Err(e) => {
                error!("Profile lookup failed for {}: {}", uid, e);
                self.send_envelope(client_id, &Reject::SendFailed.envelope())?;
                return Ok(());
            }
        };
        let record = MessageRecord {
            message_id: Uuid::new_v4().to_string(),
            chat_id: payload.chat_id.clone(),
            sender: uid.to_string(),
            text: payload.text.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.append_message(&record).await {
            error!("Failed to persist message in chat {}: {}", payload.chat_id, e);
            self.send_envelope(client_id, &Reject::SendFailed.envelope())?;
            return Ok(());
        }

        let (name, profile_pic) = sender_profile
            .map(|p| (p.name, p.profile_pic))
            .unwrap_or_else(|| (uid.to_string(), None));
        let outbound = Envelope::new(
            "receive_message",
            serde_json::to_value(ReceiveMessage {
                chat_id: payload.chat_id.clone(),
                text: record.text.clone(),
                created_at: record.created_at,
                from: MessageSender {
                    id: uid.to_string(),
                    name,
                    profile_pic,
                },
            })?,
        );

        // Echo to the sender's own connection, then best-effort forward.
        self.send_envelope(client_id, &outbound)?;
        let delivered = self.send_to_user(&recipient, &outbound)?;
        info!(
            "💬 Message in chat {} from {} ({})",
            payload.chat_id,
            uid,
            if delivered { "delivered" } else { "recipient offline" }
        );
        Ok(())
    }

    /// `user_typing` / `user_typing_stop`: fire-and-forget, no persistence.
    pub fn handle_typing(&self, uid: &str, event: &str, data: serde_json::Value) -> Result<()> {
        let Ok(payload) = serde_json::from_value::<TypingPayload>(data) else {
            return Ok(());
        };
        let outbound = Envelope::new(
            event,
            serde_json::json!({ "chatId": payload.chat_id, "from": uid }),
        );
        self.send_to_user(&payload.to, &outbound)?;
        Ok(())
    }
}
