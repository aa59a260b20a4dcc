use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub profile_pic: Option<String>,
}

/// A two-party chat; `participants` always has exactly two entries.
#[derive(Debug, Clone)]
pub struct ChatRecord {
    pub id: String,
    pub participants: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub message_id: String,
    pub chat_id: String,
    pub sender: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GroupMessageRecord {
    pub message_id: String,
    pub group_id: String,
    pub sender: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Narrow seam onto the platform's durable document store. The relay only
/// needs these primitives; everything else about the store (schema,
/// validation, the REST layer's richer queries) lives outside this process.
/// The dashmap-backed [`MemoryStore`] serves development and tests.
#[async_trait]
pub trait RelayStore: Send + Sync {
    async fn user_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Persists the online flag and the client-id reference on the user's
    /// durable record. `client_id = None` clears the reference.
    async fn set_presence(&self, user_id: &str, online: bool, client_id: Option<&str>)
        -> Result<()>;

    /// Users whose durable record is flagged online, with their stored
    /// client-id reference. Swept by the reaper.
    async fn online_presences(&self) -> Result<Vec<(String, Option<String>)>>;

    /// Peer ids of accepted friendships in either direction.
    async fn accepted_friend_ids(&self, user_id: &str) -> Result<Vec<String>>;

    /// Whether a blocking relationship exists between the two users, in
    /// either direction.
    async fn is_blocked(&self, a: &str, b: &str) -> Result<bool>;

    async fn find_chat(&self, chat_id: &str) -> Result<Option<ChatRecord>>;

    /// `None` when the group does not exist.
    async fn group_members(&self, group_id: &str) -> Result<Option<Vec<String>>>;

    async fn append_message(&self, rec: &MessageRecord) -> Result<()>;

    async fn append_group_message(&self, rec: &GroupMessageRecord) -> Result<()>;

    /// Chat history in insertion order; the client's poll path.
    async fn chat_messages(&self, chat_id: &str) -> Result<Vec<MessageRecord>>;
}
