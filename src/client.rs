//! Per-connection WebSocket plumbing: a read side that only exists to
//! detect a dead connection, and a write side that drains a client's outbox
//! and keeps the connection alive with pings.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::debug;

use crate::config::SocketConfig;
use crate::errors::TransportError;
use crate::hub::{HubHandle, CLIENT_OUTBOX_CAPACITY};

/// Registers `socket` with `hub`, then runs its read and write sides until
/// either the connection drops or the hub evicts it, unregistering on exit.
pub async fn handle_socket(socket: WebSocket, hub: HubHandle, socket_config: SocketConfig) {
	let (sender, receiver) = socket.split();
	let (outbox_tx, outbox_rx) = mpsc::channel(CLIENT_OUTBOX_CAPACITY);
	let id = hub.register(outbox_tx);

	let write_wait = socket_config.write_wait();
	let ping_period = socket_config.ping_period();
	let pong_wait = socket_config.pong_wait();

	let writer = tokio::spawn(write_pump(sender, outbox_rx, write_wait, ping_period));
	if let Err(err) = read_pump(receiver, pong_wait).await {
		debug!(%err, "client read side ended with an error");
	}

	hub.unregister(id);
	writer.abort();
}

/// Waits on incoming frames purely to track liveness: a pong resets the
/// deadline, anything else (including silence past `pong_wait`) ends the
/// connection.
async fn read_pump(mut receiver: SplitStream<WebSocket>, pong_wait: Duration) -> Result<(), TransportError> {
	let mut deadline = Instant::now() + pong_wait;
	loop {
		tokio::select! {
			() = tokio::time::sleep_until(deadline) => return Ok(()),
			frame = receiver.next() => {
				match frame {
					Some(Ok(WsMessage::Pong(_))) => deadline = Instant::now() + pong_wait,
					Some(Ok(_)) => {}
					Some(Err(err)) => return Err(TransportError::WebSocket(err)),
					None => return Ok(()),
				}
			}
		}
	}
}

/// Drains `outbox` onto the socket, one message at a time, and interleaves
/// keepalive pings every `ping_period`. Any write that doesn't complete
/// within `write_wait` ends the connection.
async fn write_pump(
	mut sender: SplitSink<WebSocket, WsMessage>,
	mut outbox: mpsc::Receiver<Arc<str>>,
	write_wait: Duration,
	ping_period: Duration,
) -> Result<(), TransportError> {
	let mut ticker = tokio::time::interval(ping_period);
	let _ = ticker.tick().await;

	loop {
		tokio::select! {
			received = outbox.recv() => {
				match received {
					Some(text) => send_within(&mut sender, WsMessage::Text(text.to_string().into()), write_wait).await?,
					None => {
						let _ = send_within(&mut sender, WsMessage::Close(None), write_wait).await;
						return Ok(());
					}
				}
			}
			_ = ticker.tick() => {
				send_within(&mut sender, WsMessage::Ping(Vec::new().into()), write_wait).await?;
			}
		}
	}
}

async fn send_within(sender: &mut SplitSink<WebSocket, WsMessage>, message: WsMessage, write_wait: Duration) -> Result<(), TransportError> {
	match timeout(write_wait, sender.send(message)).await {
		Ok(Ok(())) => Ok(()),
		Ok(Err(err)) => Err(TransportError::WebSocket(err)),
		Err(_) => Err(TransportError::WriteTimeout),
	}
}
