use thiserror::Error;

use crate::protocol::Envelope;

/// Rejection reasons surfaced to a client as an `error` event. The Display
/// strings are the wire-visible messages.
#[derive(Debug, Error)]
pub enum Reject {
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Failed to join")]
    JoinFailed,
    #[error("invalid json")]
    InvalidJson,
    #[error("invalid payload")]
    InvalidPayload,
    #[error("Chat not found")]
    ChatNotFound,
    #[error("Not a participant of this chat")]
    NotParticipant,
    #[error("Chat has no recipient")]
    NoRecipient,
    #[error("Message rejected")]
    Blocked,
    #[error("Group not found")]
    GroupNotFound,
    #[error("Not a member of this group")]
    NotGroupMember,
    #[error("Failed to send message")]
    SendFailed,
}

impl Reject {
    pub fn envelope(&self) -> Envelope {
        Envelope::error(&self.to_string())
    }
}
