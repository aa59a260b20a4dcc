use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::Reject;
use crate::protocol::{
    Envelope, GroupMessage, GroupSender, GroupTypingPayload, JoinGroupPayload,
    SendGroupMsgPayload,
};
use crate::server::RelayServer;
use crate::store::GroupMessageRecord;

impl RelayServer {
    /// Resolves group membership for a sender, turning every failure mode
    /// into an explicit rejection. Membership lives in the durable store;
    /// the in-memory room only scopes fan-out.
    async fn require_membership(&self, client_id: &str, uid: &str, group_id: &str) -> Result<bool> {
        let members = match self.store.group_members(group_id).await {
            Ok(members) => members,
            Err(e) => {
                error!("Membership lookup failed for group {}: {}", group_id, e);
                self.send_envelope(client_id, &Reject::SendFailed.envelope())?;
                return Ok(false);
            }
        };
        match members {
            None => {
                self.send_envelope(client_id, &Reject::GroupNotFound.envelope())?;
                Ok(false)
            }
            Some(members) if !members.iter().any(|m| m == uid) => {
                self.send_envelope(client_id, &Reject::NotGroupMember.envelope())?;
                Ok(false)
            }
            Some(_) => Ok(true),
        }
    }

    /// `join_group`: membership-gated room join.
    pub async fn handle_join_group(
        &self,
        client_id: &str,
        uid: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let Some(payload) = self.decode_payload::<JoinGroupPayload>(client_id, data)? else {
            return Ok(());
        };
        if !self.require_membership(client_id, uid, &payload.group_id).await? {
            return Ok(());
        }
        self.rooms
            .entry(payload.group_id.clone())
            .or_default()
            .insert(client_id.to_string());
        info!("🧑‍🤝‍🧑 Client {} joined group {}", client_id, payload.group_id);
        Ok(())
    }

    /// `send_group_msg`: membership-gated persist-then-broadcast. Every
    /// room member receives exactly one copy, the sender included.
    pub async fn handle_send_group_msg(
        &self,
        client_id: &str,
        uid: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let Some(payload) = self.decode_payload::<SendGroupMsgPayload>(client_id, data)? else {
            return Ok(());
        };
        if !self.require_membership(client_id, uid, &payload.group_id).await? {
            return Ok(());
        }

        let record = GroupMessageRecord {
            message_id: Uuid::new_v4().to_string(),
            group_id: payload.group_id.clone(),
            sender: uid.to_string(),
            text: payload.text.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.append_group_message(&record).await {
            error!("Failed to persist group message in {}: {}", payload.group_id, e);
            self.send_envelope(client_id, &Reject::SendFailed.envelope())?;
            return Ok(());
        }

        // The record is already persisted; a profile miss or lookup failure
        // only degrades the display name, it must not drop the broadcast.
        let sender_name = match self.store.user_profile(uid).await {
            Ok(Some(profile)) => profile.name,
            Ok(None) => uid.to_string(),
            Err(e) => {
                warn!("Profile lookup failed for {}: {}", uid, e);
                uid.to_string()
            }
        };
        let outbound = Envelope::new(
            "group_message",
            serde_json::to_value(GroupMessage {
                group_id: payload.group_id.clone(),
                text: record.text.clone(),
                sender: GroupSender {
                    id: uid.to_string(),
                    name: sender_name,
                },
                created_at: record.created_at,
            })?,
        );
        let delivered = self.broadcast_room(&payload.group_id, &outbound, None)?;
        info!(
            "💬 Group message in {} from {} reached {} clients",
            payload.group_id, uid, delivered
        );
        Ok(())
    }

    /// `group_typing` / `group_typing_stop`: room fan-out minus the sender.
    /// Only clients that passed the `join_group` gate are in the room, so
    /// requiring room presence here keeps outsiders from injecting
    /// indicators.
    pub fn handle_group_typing(
        &self,
        client_id: &str,
        uid: &str,
        event: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let Ok(payload) = serde_json::from_value::<GroupTypingPayload>(data) else {
            return Ok(());
        };
        let in_room = self
            .rooms
            .get(&payload.group_id)
            .map(|room| room.contains(client_id))
            .unwrap_or(false);
        if !in_room {
            return Ok(());
        }
        let outbound = Envelope::new(
            event,
            serde_json::json!({ "groupId": payload.group_id, "userId": uid }),
        );
        self.broadcast_room(&payload.group_id, &outbound, Some(client_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use crate::protocol::GroupMessage;
    use crate::server::testutil::{flaky_server, next_envelope, test_server};

    #[tokio::test]
    async fn non_member_cannot_join_or_send() {
        let (server, store) = test_server();
        store.add_user("u3", "Eve");
        store.add_group("g1", &["u1", "u2"]);
        let mut rx = server.insert_test_connection("e", Some("u3"));

        server
            .handle_join_group("e", "u3", serde_json::json!({"groupId": "g1"}))
            .await
            .unwrap();
        let err = next_envelope(&mut rx).unwrap();
        assert_eq!(err.event, "error");
        assert_eq!(err.data["message"], "Not a member of this group");
        assert!(server.rooms.get("g1").is_none());

        server
            .handle_send_group_msg("e", "u3", serde_json::json!({"groupId": "g1", "text": "spam"}))
            .await
            .unwrap();
        let err = next_envelope(&mut rx).unwrap();
        assert_eq!(err.event, "error");
        assert_eq!(store.group_message_count("g1"), 0);
    }

    #[tokio::test]
    async fn missing_group_rejects_explicitly() {
        let (server, _store) = test_server();
        let mut rx = server.insert_test_connection("a", Some("u1"));

        server
            .handle_send_group_msg("a", "u1", serde_json::json!({"groupId": "nope", "text": "hi"}))
            .await
            .unwrap();
        let err = next_envelope(&mut rx).unwrap();
        assert_eq!(err.event, "error");
        assert_eq!(err.data["message"], "Group not found");
    }

    #[tokio::test]
    async fn membership_lookup_failure_rejects_explicitly() {
        let (server, store) = flaky_server();
        store.fail_lookups.store(true, Ordering::SeqCst);
        let mut rx = server.insert_test_connection("a", Some("u1"));

        server
            .handle_send_group_msg("a", "u1", serde_json::json!({"groupId": "g1", "text": "hi"}))
            .await
            .unwrap();
        let err = next_envelope(&mut rx).unwrap();
        assert_eq!(err.event, "error");
        assert_eq!(err.data["message"], "Failed to send message");

        server
            .handle_join_group("a", "u1", serde_json::json!({"groupId": "g1"}))
            .await
            .unwrap();
        let err = next_envelope(&mut rx).unwrap();
        assert_eq!(err.event, "error");
        assert!(server.rooms.get("g1").is_none());
    }

    #[tokio::test]
    async fn group_message_reaches_every_member_once_including_sender() {
        let (server, store) = test_server();
        store.add_user("u1", "Ana");
        store.add_user("u2", "Ben");
        store.add_group("g1", &["u1", "u2"]);
        let mut rx_a = server.insert_test_connection("a", Some("u1"));
        let mut rx_b = server.insert_test_connection("b", Some("u2"));

        server
            .handle_join_group("a", "u1", serde_json::json!({"groupId": "g1"}))
            .await
            .unwrap();
        server
            .handle_join_group("b", "u2", serde_json::json!({"groupId": "g1"}))
            .await
            .unwrap();
        server
            .handle_send_group_msg("a", "u1", serde_json::json!({"groupId": "g1", "text": "hey"}))
            .await
            .unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let evt = next_envelope(rx).unwrap();
            assert_eq!(evt.event, "group_message");
            let payload: GroupMessage = serde_json::from_value(evt.data).unwrap();
            assert_eq!(payload.text, "hey");
            assert_eq!(payload.sender.name, "Ana");
            assert!(next_envelope(rx).is_none());
        }
        assert_eq!(store.group_message_count("g1"), 1);
    }

    #[tokio::test]
    async fn group_typing_skips_the_sender() {
        let (server, store) = test_server();
        store.add_user("u1", "Ana");
        store.add_user("u2", "Ben");
        store.add_group("g1", &["u1", "u2"]);
        let mut rx_a = server.insert_test_connection("a", Some("u1"));
        let mut rx_b = server.insert_test_connection("b", Some("u2"));
        server
            .handle_join_group("a", "u1", serde_json::json!({"groupId": "g1"}))
            .await
            .unwrap();
        server
            .handle_join_group("b", "u2", serde_json::json!({"groupId": "g1"}))
            .await
            .unwrap();

        server
            .handle_group_typing("a", "u1", "group_typing", serde_json::json!({"groupId": "g1"}))
            .unwrap();
        assert!(next_envelope(&mut rx_a).is_none());
        let evt = next_envelope(&mut rx_b).unwrap();
        assert_eq!(evt.event, "group_typing");
        assert_eq!(evt.data["userId"], "u1");
    }

    #[tokio::test]
    async fn group_typing_from_outside_the_room_is_dropped() {
        let (server, store) = test_server();
        store.add_user("u1", "Ana");
        store.add_user("u2", "Ben");
        store.add_group("g1", &["u2"]);
        // u1 never joined the room (and is not a member).
        let _rx_a = server.insert_test_connection("a", Some("u1"));
        let mut rx_b = server.insert_test_connection("b", Some("u2"));
        server
            .handle_join_group("b", "u2", serde_json::json!({"groupId": "g1"}))
            .await
            .unwrap();

        server
            .handle_group_typing("a", "u1", "group_typing", serde_json::json!({"groupId": "g1"}))
            .unwrap();
        assert!(next_envelope(&mut rx_b).is_none());
    }
}
