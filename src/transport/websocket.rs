use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use std::sync::Arc;

use crate::connection::Connection;
use crate::gateway::Gateway;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::RelayError;

pub async fn start_websocket_server(addr: &str, gateway: Arc<Gateway>) -> Result<(), RelayError> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{addr}");
    run_websocket_server(listener, gateway).await
}

/// Accept loop over an already-bound listener (tests bind port 0 and pass
/// the listener in).
pub async fn run_websocket_server(
    listener: TcpListener,
    gateway: Arc<Gateway>,
) -> Result<(), RelayError> {
    loop {
        let (stream, _) = listener.accept().await?;
        let gateway = gateway.clone();
        tokio::spawn(handle_connection(stream, gateway));
    }
}

async fn handle_connection(stream: TcpStream, gateway: Arc<Gateway>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake error: {e}");
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Channel for this connection; the gateway owns the sending half.
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let conn_id = gateway.register(Connection::new(tx));
    info!("{conn_id} connected");

    // Forward messages from the gateway to the client.
    let writer_conn_id = conn_id.clone();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = ws_sender.send(msg).await {
                debug!("send loop closed for {writer_conn_id}: {e}");
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        if !msg.is_text() {
            continue;
        }
        let text = match msg.to_text() {
            Ok(text) => text,
            Err(_) => continue,
        };
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Join { room }) => {
                if let Err(e) = gateway.join(&conn_id, &room).await {
                    warn!("join of {room} by {conn_id} failed: {e}");
                    gateway.send_to(
                        &conn_id,
                        &ServerMessage::Error {
                            message: format!("join of {room} failed"),
                        },
                    );
                }
            }

            Ok(ClientMessage::Leave { room }) => {
                if let Err(e) = gateway.leave(&conn_id, &room).await {
                    warn!("leave of {room} by {conn_id} failed: {e}");
                    gateway.send_to(
                        &conn_id,
                        &ServerMessage::Error {
                            message: format!("leave of {room} failed"),
                        },
                    );
                }
            }

            Err(err) => {
                warn!("invalid client message from {conn_id}: {err} | {text}");
            }
        }
    }

    // The link is gone; release every membership before dropping the
    // connection, so counts can't leak.
    if let Err(e) = gateway.on_disconnect(&conn_id).await {
        warn!("disconnect cleanup for {conn_id} failed: {e}");
    }
    info!("{conn_id} disconnected");
}
