use anyhow::Result;

use crate::protocol::{Envelope, FriendStatusUpdate};
use crate::server::RelayServer;

impl RelayServer {
    /// Fans out a presence flip to every accepted friend currently in the
    /// registry. Pure fan-out: unregistered friends are skipped, nothing is
    /// persisted. Returns how many friends were notified.
    pub async fn notify_friends(&self, user_id: &str, status: &str) -> Result<usize> {
        let friends = self.store.accepted_friend_ids(user_id).await?;
        let envelope = Envelope::new(
            "friend_status_update",
            serde_json::to_value(FriendStatusUpdate {
                user_id: user_id.to_string(),
                status: status.to_string(),
            })?,
        );
        let mut notified = 0;
        for friend in friends {
            if self.send_to_user(&friend, &envelope)? {
                notified += 1;
            }
        }
        Ok(notified)
    }
}
