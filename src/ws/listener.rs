use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;

use crate::server::RelayServer;

impl RelayServer {
    /// Accept loop; one task per inbound connection.
    pub async fn run(&self, host: &str, port: u16) -> Result<()> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr).await?;
        info!("🚀 lingo-relay listening on {}", addr);

        while let Ok((stream, peer_addr)) = listener.accept().await {
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    crate::ws::connection::handle_connection(stream, peer_addr, server).await
                {
                    tracing::error!("Connection error from {}: {}", peer_addr, e);
                }
            });
        }

        Ok(())
    }
}
