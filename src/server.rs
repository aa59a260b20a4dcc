use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::auth::TokenVerifier;
use crate::presence::PresenceRegistry;
use crate::store::RelayStore;

/// Per-connection state. `uid` stays `None` until a successful `join`;
/// unauthenticated connections remain open and are rejected per event.
#[derive(Clone)]
pub struct Connection {
    pub client_id: String,
    pub uid: Option<String>,
    pub addr: SocketAddr,
    pub sender: mpsc::UnboundedSender<Message>,
    pub connected_at: Arc<Mutex<Instant>>,
}

/// Shared relay state. Every field is a shared handle; cloning the server
/// clones views onto the same state.
#[derive(Clone)]
pub struct RelayServer {
    pub connections: Arc<DashMap<String, Connection>>,
    pub presence: Arc<PresenceRegistry>,
    pub rooms: Arc<DashMap<String, DashSet<String>>>,
    pub store: Arc<dyn RelayStore>,
    pub verifier: Arc<TokenVerifier>,
}

impl RelayServer {
    pub fn new(store: Arc<dyn RelayStore>, verifier: TokenVerifier) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            presence: Arc::new(PresenceRegistry::new()),
            rooms: Arc::new(DashMap::new()),
            store,
            verifier: Arc::new(verifier),
        }
    }

    /// User id bound to a connection, if it has authenticated.
    pub fn bound_uid(&self, client_id: &str) -> Option<String> {
        self.connections
            .get(client_id)
            .and_then(|c| c.uid.clone())
    }

    /// Drops the client from every room it joined.
    pub fn leave_all_rooms(&self, client_id: &str) {
        for room in self.rooms.iter() {
            room.value().remove(client_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());
    }

    #[cfg(test)]
    pub fn insert_test_connection(
        &self,
        client_id: &str,
        uid: Option<&str>,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(
            client_id.to_string(),
            Connection {
                client_id: client_id.to_string(),
                uid: uid.map(|u| u.to_string()),
                addr: "127.0.0.1:0".parse().unwrap(),
                sender: tx,
                connected_at: Arc::new(Mutex::new(Instant::now())),
            },
        );
        if let Some(uid) = uid {
            self.presence.register(uid, client_id);
        }
        rx
    }
}
