use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

use crate::server::{Connection, RelayServer};

/// Accepts the WebSocket handshake and runs the connection to completion:
/// a writer task drains the outbound channel while the read loop feeds the
/// dispatcher. Cleanup on exit covers rooms, the connection map and the
/// session teardown (guarded deregister, offline flag, friend fan-out).
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    server: RelayServer,
) -> Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let client_id = Uuid::new_v4().to_string();
    tracing::info!("🔗 Client {} connected from {}", client_id, peer_addr);

    let writer_client = client_id.clone();
    let writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(&msg, Message::Close(_));
            if let Err(e) = ws_sender.send(msg).await {
                tracing::error!("Failed to send to {}: {}", writer_client, e);
                break;
            }
            if is_close {
                let _ = ws_sender.close().await;
                break;
            }
        }
    });

    server.connections.insert(
        client_id.clone(),
        Connection {
            client_id: client_id.clone(),
            uid: None,
            addr: peer_addr,
            sender: tx,
            connected_at: Arc::new(Mutex::new(Instant::now())),
        },
    );

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(message) => {
                if let Err(e) = server.handle_incoming(message, &client_id).await {
                    tracing::error!("Error handling message from {}: {}", client_id, e);
                }
            }
            Err(e) => {
                tracing::error!("WebSocket error from {}: {}", client_id, e);
                break;
            }
        }
    }

    let removed = server.connections.remove(&client_id);
    writer_task.abort();
    server.leave_all_rooms(&client_id);
    if let Some((_, connection)) = removed {
        let uptime = connection.connected_at.lock().elapsed();
        tracing::info!("🔌 Client {} disconnected after {:?}", client_id, uptime);
        server.handle_disconnect(&connection).await;
    }
    Ok(())
}
