use anyhow::Result;
use tracing::{error, info, warn};

use crate::error::Reject;
use crate::protocol::Envelope;
use crate::server::{Connection, RelayServer};

impl RelayServer {
    /// `join`: authenticate the connection with a bearer token. The token
    /// arrives either as a bare string or as `{"token": ...}`. On failure
    /// the connection stays open but unauthenticated; every later event is
    /// rejected individually.
    pub async fn handle_join(&self, client_id: &str, data: &serde_json::Value) -> Result<()> {
        let token = data
            .as_str()
            .or_else(|| data.get("token").and_then(|v| v.as_str()))
            .unwrap_or("");

        let claims = match self.verifier.verify(token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!("❌ Join rejected for client {}: {}", client_id, e);
                self.send_envelope(client_id, &Reject::AuthenticationFailed.envelope())?;
                return Ok(());
            }
        };
        let uid = claims.id;

        if let Some(mut conn) = self.connections.get_mut(client_id) {
            conn.uid = Some(uid.clone());
        }
        if let Some(displaced) = self.presence.register(&uid, client_id) {
            if displaced != client_id {
                // Previous device stays connected but is no longer addressable.
                info!("User {} displaced connection {}", uid, displaced);
            }
        }
        if let Err(e) = self.store.set_presence(&uid, true, Some(client_id)).await {
            // The durable record never flipped online, so the reaper would
            // never see this session. Undo the in-memory half and tell the
            // client the join did not take.
            error!("Failed to persist online state for {}: {}", uid, e);
            self.presence.deregister(&uid, client_id);
            if let Some(mut conn) = self.connections.get_mut(client_id) {
                conn.uid = None;
            }
            self.send_envelope(client_id, &Reject::JoinFailed.envelope())?;
            return Ok(());
        }
        info!("✅ User {} joined with client {}", uid, client_id);

        self.send_envelope(client_id, &Envelope::new("joined_success", serde_json::json!({})))?;
        self.notify_friends(&uid, "online").await?;
        Ok(())
    }

    /// Transport-level disconnect (clean close or error). The guarded
    /// deregister keeps a displaced connection's teardown from marking a
    /// freshly joined session offline; calling this twice for the same
    /// connection is a no-op the second time.
    pub async fn handle_disconnect(&self, connection: &Connection) {
        let Some(uid) = &connection.uid else {
            return;
        };
        if !self.presence.deregister(uid, &connection.client_id) {
            return;
        }
        if let Err(e) = self.store.set_presence(uid, false, None).await {
            warn!("Failed to persist offline state for {}: {}", uid, e);
        }
        info!("👋 User {} went offline", uid);
        if let Err(e) = self.notify_friends(uid, "offline").await {
            warn!("Failed to notify friends of {}: {}", uid, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use crate::auth::issue_token;
    use crate::protocol::FriendStatusUpdate;
    use crate::store::RelayStore;
    use crate::server::testutil::{flaky_server, next_envelope, test_server, TEST_SECRET};

    #[tokio::test]
    async fn join_registers_presence_and_acks() {
        let (server, store) = test_server();
        store.add_user("u1", "Ana");
        let mut rx = server.insert_test_connection("c1", None);

        let token = issue_token(TEST_SECRET, "u1", 60);
        server
            .handle_join("c1", &serde_json::Value::String(token))
            .await
            .unwrap();

        assert_eq!(server.presence.lookup("u1"), Some("c1".to_string()));
        assert_eq!(server.bound_uid("c1"), Some("u1".to_string()));
        let ack = next_envelope(&mut rx).unwrap();
        assert_eq!(ack.event, "joined_success");
        let online = store.online_presences().await.unwrap();
        assert_eq!(online, vec![("u1".to_string(), Some("c1".to_string()))]);
    }

    #[tokio::test]
    async fn bad_token_leaves_connection_unauthenticated() {
        let (server, _store) = test_server();
        let mut rx = server.insert_test_connection("c1", None);

        server
            .handle_join("c1", &serde_json::Value::String("garbage".into()))
            .await
            .unwrap();

        assert_eq!(server.bound_uid("c1"), None);
        assert_eq!(server.presence.len(), 0);
        let err = next_envelope(&mut rx).unwrap();
        assert_eq!(err.event, "error");
        assert_eq!(err.data["message"], "Authentication failed");
        // The connection is still in the map, just without an identity.
        assert!(server.connections.contains_key("c1"));
    }

    #[tokio::test]
    async fn join_rolls_back_when_presence_persist_fails() {
        let (server, store) = flaky_server();
        store.inner.add_user("u1", "Ana");
        store.fail_set_presence.store(true, Ordering::SeqCst);
        let mut rx = server.insert_test_connection("c1", None);

        let token = issue_token(TEST_SECRET, "u1", 60);
        server
            .handle_join("c1", &serde_json::Value::String(token))
            .await
            .unwrap();

        let err = next_envelope(&mut rx).unwrap();
        assert_eq!(err.event, "error");
        assert_eq!(err.data["message"], "Failed to join");
        // Registry and uid binding were rolled back; the client can retry.
        assert_eq!(server.presence.lookup("u1"), None);
        assert_eq!(server.bound_uid("c1"), None);
        assert!(store.inner.online_presences().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_join_displaces_first_and_guard_holds_on_disconnect() {
        let (server, store) = test_server();
        store.add_user("u1", "Ana");
        let _rx1 = server.insert_test_connection("c1", None);
        let _rx2 = server.insert_test_connection("c2", None);

        let token = issue_token(TEST_SECRET, "u1", 60);
        server
            .handle_join("c1", &serde_json::Value::String(token.clone()))
            .await
            .unwrap();
        server
            .handle_join("c2", &serde_json::Value::String(token))
            .await
            .unwrap();
        assert_eq!(server.presence.lookup("u1"), Some("c2".to_string()));

        // The displaced connection finally drops; u1 must stay online.
        let (_, old_conn) = server.connections.remove("c1").unwrap();
        server.handle_disconnect(&old_conn).await;
        assert_eq!(server.presence.lookup("u1"), Some("c2".to_string()));
        let online = store.online_presences().await.unwrap();
        assert_eq!(online, vec![("u1".to_string(), Some("c2".to_string()))]);
    }

    #[tokio::test]
    async fn disconnect_notifies_friends_exactly_once_and_is_idempotent() {
        let (server, store) = test_server();
        store.add_user("u1", "Ana");
        store.add_user("u2", "Ben");
        store.add_friendship("u1", "u2");
        let _rx1 = server.insert_test_connection("c1", Some("u1"));
        let mut rx2 = server.insert_test_connection("c2", Some("u2"));

        let (_, conn) = server.connections.remove("c1").unwrap();
        server.handle_disconnect(&conn).await;
        server.handle_disconnect(&conn).await;

        let update = next_envelope(&mut rx2).unwrap();
        assert_eq!(update.event, "friend_status_update");
        let payload: FriendStatusUpdate = serde_json::from_value(update.data).unwrap();
        assert_eq!(payload.user_id, "u1");
        assert_eq!(payload.status, "offline");
        // Second teardown produced no duplicate notification.
        assert!(next_envelope(&mut rx2).is_none());
    }
}
