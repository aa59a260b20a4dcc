use anyhow::Result;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;

use super::{ChatRecord, GroupMessageRecord, MessageRecord, RelayStore, UserProfile};

/// In-memory store for development and tests. Mirrors the shape of the
/// platform's document collections (users, chats, groups, friend requests,
/// blocks, messages) without any durability.
pub struct MemoryStore {
    users: DashMap<String, UserProfile>,
    presence: DashMap<String, (bool, Option<String>)>,
    friendships: RwLock<Vec<(String, String)>>,
    blocks: DashSet<(String, String)>,
    chats: DashMap<String, ChatRecord>,
    groups: DashMap<String, Vec<String>>,
    messages: DashMap<String, Vec<MessageRecord>>,
    group_messages: DashMap<String, Vec<GroupMessageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            presence: DashMap::new(),
            friendships: RwLock::new(Vec::new()),
            blocks: DashSet::new(),
            chats: DashMap::new(),
            groups: DashMap::new(),
            messages: DashMap::new(),
            group_messages: DashMap::new(),
        }
    }
}

// Seeding helpers used by tests and local development setups.
#[allow(dead_code)]
impl MemoryStore {
    pub fn add_user(&self, id: &str, name: &str) {
        self.users.insert(
            id.to_string(),
            UserProfile {
                id: id.to_string(),
                name: name.to_string(),
                profile_pic: None,
            },
        );
    }

    pub fn add_chat(&self, chat_id: &str, a: &str, b: &str) {
        self.chats.insert(
            chat_id.to_string(),
            ChatRecord {
                id: chat_id.to_string(),
                participants: vec![a.to_string(), b.to_string()],
            },
        );
    }

    pub fn add_group(&self, group_id: &str, members: &[&str]) {
        self.groups.insert(
            group_id.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
    }

    /// Records an accepted friendship edge (direction does not matter for
    /// the relay's reads).
    pub fn add_friendship(&self, sender: &str, receiver: &str) {
        self.friendships
            .write()
            .push((sender.to_string(), receiver.to_string()));
    }

    pub fn add_block(&self, blocker: &str, blocked: &str) {
        self.blocks
            .insert((blocker.to_string(), blocked.to_string()));
    }

    pub fn group_message_count(&self, group_id: &str) -> usize {
        self.group_messages
            .get(group_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayStore for MemoryStore {
    async fn user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.users.get(user_id).map(|u| u.value().clone()))
    }

    async fn set_presence(
        &self,
        user_id: &str,
        online: bool,
        client_id: Option<&str>,
    ) -> Result<()> {
        self.presence.insert(
            user_id.to_string(),
            (online, client_id.map(|c| c.to_string())),
        );
        Ok(())
    }

    async fn online_presences(&self) -> Result<Vec<(String, Option<String>)>> {
        Ok(self
            .presence
            .iter()
            .filter(|e| e.value().0)
            .map(|e| (e.key().clone(), e.value().1.clone()))
            .collect())
    }

    async fn accepted_friend_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let edges = self.friendships.read();
        Ok(edges
            .iter()
            .filter_map(|(s, r)| {
                if s == user_id {
                    Some(r.clone())
                } else if r == user_id {
                    Some(s.clone())
                } else {
                    None
                }
            })
            .collect())
    }

    async fn is_blocked(&self, a: &str, b: &str) -> Result<bool> {
        Ok(self.blocks.contains(&(a.to_string(), b.to_string()))
            || self.blocks.contains(&(b.to_string(), a.to_string())))
    }

    async fn find_chat(&self, chat_id: &str) -> Result<Option<ChatRecord>> {
        Ok(self.chats.get(chat_id).map(|c| c.value().clone()))
    }

    async fn group_members(&self, group_id: &str) -> Result<Option<Vec<String>>> {
        Ok(self.groups.get(group_id).map(|g| g.value().clone()))
    }

    async fn append_message(&self, rec: &MessageRecord) -> Result<()> {
        self.messages
            .entry(rec.chat_id.clone())
            .or_default()
            .push(rec.clone());
        Ok(())
    }

    async fn append_group_message(&self, rec: &GroupMessageRecord) -> Result<()> {
        self.group_messages
            .entry(rec.group_id.clone())
            .or_default()
            .push(rec.clone());
        Ok(())
    }

    async fn chat_messages(&self, chat_id: &str) -> Result<Vec<MessageRecord>> {
        Ok(self
            .messages
            .get(chat_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }
}
