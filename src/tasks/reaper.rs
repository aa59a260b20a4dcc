use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::server::RelayServer;

/// Periodic sweep reconciling persisted online state against live
/// connections. This is the only path that corrects drift left by
/// ungraceful disconnects (process crash, dropped TCP with no close frame);
/// staleness can persist for up to one sweep interval.
// RelayServer is a bundle of shared handles, so it moves into the task
// by value.
pub fn spawn_reaper(
    server: RelayServer,
    sweep_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        info!("⏰ Stale-connection reaper running every {:?}", sweep_interval);
        let mut ticker = interval(sweep_interval);
        // The first tick fires immediately; skip it so a restart does not
        // sweep before clients had a chance to reconnect.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = server.reap_stale().await {
                        warn!("Reaper sweep failed: {}", e);
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });
}

impl RelayServer {
    /// One sweep: every durable record flagged online must point at a live
    /// connection bound to that user; anything else is cleared, removed
    /// from the registry and announced to friends as offline.
    pub async fn reap_stale(&self) -> Result<usize> {
        let mut reaped = 0;
        for (uid, client_ref) in self.store.online_presences().await? {
            let alive = client_ref
                .as_deref()
                .and_then(|cid| self.connections.get(cid))
                .map(|conn| conn.uid.as_deref() == Some(uid.as_str()))
                .unwrap_or(false);
            if alive {
                continue;
            }
            info!("🧹 Stale presence for user {}, cleaning up", uid);
            self.store.set_presence(&uid, false, None).await?;
            self.presence.remove(&uid);
            if let Err(e) = self.notify_friends(&uid, "offline").await {
                warn!("Failed to notify friends of {}: {}", uid, e);
            }
            reaped += 1;
        }
        Ok(reaped)
    }
}
