//! WebSocket implementation of the upstream bus client.
//!
//! A single supervisor task owns the connection for the life of the process:
//! it dials with a timeout, retries with exponential backoff, and after every
//! (re)connect re-issues `subscribe` for each room in the subscribed set
//! before draining commands. A bus outage therefore degrades delivery for
//! its duration instead of silently dropping subscriptions.
//!
//! Commands are enqueued on an unbounded channel; `subscribe` succeeds once
//! the command is accepted by the supervisor. The protocol carries no
//! subscribe ack, so loss windows around a reconnect are closed by the
//! resubscribe pass and by the periodic reconciler.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::bus::Bus;
use crate::bus::message::{BusCommand, BusMessage};
use crate::utils::backoff::{ExponentialBackoff, RetryPolicy};
use crate::utils::error::RelayError;

pub struct WsBus {
    cmd_tx: UnboundedSender<BusCommand>,
    subscribed: Arc<DashSet<String>>,
}

impl WsBus {
    /// Spawn the supervisor task for `url` and return the bus handle along
    /// with the inbound message channel.
    pub fn connect(url: String, retry: RetryPolicy) -> (Self, UnboundedReceiver<BusMessage>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let subscribed = Arc::new(DashSet::new());

        tokio::spawn(run_bus_loop(
            url,
            cmd_rx,
            inbound_tx,
            subscribed.clone(),
            retry,
        ));

        (Self { cmd_tx, subscribed }, inbound_rx)
    }

    fn send_command(&self, command: BusCommand) -> Result<(), RelayError> {
        self.cmd_tx
            .send(command)
            .map_err(|_| RelayError::Bus("bus supervisor task terminated".into()))
    }
}

#[async_trait]
impl Bus for WsBus {
    async fn subscribe(&self, room: &str) -> Result<(), RelayError> {
        self.subscribed.insert(room.to_string());
        self.send_command(BusCommand::Subscribe {
            topic: room.to_string(),
        })
    }

    async fn unsubscribe(&self, room: &str) -> Result<(), RelayError> {
        self.subscribed.remove(room);
        self.send_command(BusCommand::Unsubscribe {
            topic: room.to_string(),
        })
    }

    async fn publish(&self, room: &str, payload: &str) -> Result<(), RelayError> {
        self.send_command(BusCommand::Publish {
            topic: room.to_string(),
            payload: payload.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }
}

async fn run_bus_loop(
    url: String,
    mut cmd_rx: UnboundedReceiver<BusCommand>,
    inbound_tx: UnboundedSender<BusMessage>,
    subscribed: Arc<DashSet<String>>,
    retry: RetryPolicy,
) {
    let mut backoff = ExponentialBackoff::new(retry.base_delay, retry.max_delay);

    loop {
        let ws_stream =
            match tokio::time::timeout(retry.op_timeout, connect_async(url.as_str())).await {
                Ok(Ok((ws_stream, _))) => ws_stream,
                Ok(Err(e)) => {
                    let delay = backoff.next_delay();
                    warn!("bus connect to {url} failed: {e}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(_) => {
                    let delay = backoff.next_delay();
                    warn!("bus connect to {url} timed out; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

        backoff.reset();
        info!("connected to upstream bus at {url}");
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        // Re-establish every subscription this relay believes it holds.
        let mut resubscribe_failed = false;
        for room in subscribed.iter() {
            let command = BusCommand::Subscribe {
                topic: room.key().clone(),
            };
            if !send_frame(&mut ws_sender, &command).await {
                resubscribe_failed = true;
                break;
            }
        }
        if resubscribe_failed {
            warn!("bus connection lost during resubscribe; reconnecting");
            continue;
        }

        loop {
            tokio::select! {
                command = cmd_rx.recv() => {
                    match command {
                        Some(command) => {
                            if !send_frame(&mut ws_sender, &command).await {
                                warn!("bus connection lost; reconnecting");
                                break;
                            }
                        }
                        // All bus handles dropped; nothing left to supervise.
                        None => return,
                    }
                }
                frame = ws_receiver.next() => {
                    match frame {
                        Some(Ok(msg)) if msg.is_text() => {
                            let text = match msg.to_text() {
                                Ok(text) => text,
                                Err(_) => continue,
                            };
                            match serde_json::from_str::<BusMessage>(text) {
                                Ok(message) => {
                                    debug!("bus message for room {}", message.topic);
                                    if inbound_tx.send(message).is_err() {
                                        // Delivery pump is gone; shut down.
                                        return;
                                    }
                                }
                                Err(e) => warn!("invalid bus message: {e} | {text}"),
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("bus read error: {e}; reconnecting");
                            break;
                        }
                        None => {
                            warn!("bus closed the connection; reconnecting");
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn send_frame<S>(sender: &mut S, command: &BusCommand) -> bool
where
    S: futures_util::Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let text = match serde_json::to_string(command) {
        Ok(text) => text,
        Err(e) => {
            warn!("failed to serialize bus command: {e}");
            return true;
        }
    };
    match sender.send(WsMessage::text(text)).await {
        Ok(()) => true,
        Err(e) => {
            debug!("bus send failed: {e}");
            false
        }
    }
}
