//! Fan-out broadcast hub: tracks connected clients and relays encoded
//! messages to each, evicting any client whose outbox is full rather than
//! blocking the broadcaster.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;

use crate::source::Source;

/// Capacity of a client's outbound message queue. A client this far behind
/// is evicted rather than allowed to stall the broadcast.
pub const CLIENT_OUTBOX_CAPACITY: usize = 256;

/// Identifies one connected client within a hub.
pub type ClientId = u64;

enum HubCommand {
	Register(ClientId, mpsc::Sender<Arc<str>>),
	Unregister(ClientId),
	Broadcast(Arc<str>),
}

/// A handle to a running hub: cheap to clone, every clone talks to the same
/// background task and client set.
#[derive(Clone)]
pub struct HubHandle {
	commands: mpsc::UnboundedSender<HubCommand>,
	next_id: Arc<AtomicU64>,
	client_count: Arc<AtomicU64>,
}

impl HubHandle {
	/// Spawns the hub's run loop. `source` is a back-reference used only to
	/// send a newly-registered client its initial snapshot; held weakly so
	/// the hub and its owning source don't keep each other alive forever.
	#[must_use]
	pub fn spawn(source: Weak<Source>) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let client_count = Arc::new(AtomicU64::new(0));
		let handle = Self { commands: tx, next_id: Arc::new(AtomicU64::new(0)), client_count: Arc::clone(&client_count) };
		tokio::spawn(run(rx, source, client_count));
		handle
	}

	/// Registers a new client's outbox and returns its id. The hub sends the
	/// client its initial data asynchronously once registration lands.
	pub fn register(&self, outbox: mpsc::Sender<Arc<str>>) -> ClientId {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let _ = self.commands.send(HubCommand::Register(id, outbox));
		id
	}

	/// Removes a client from the broadcast set.
	pub fn unregister(&self, id: ClientId) {
		let _ = self.commands.send(HubCommand::Unregister(id));
	}

	/// Sends `message` to every currently-registered client. Clients whose
	/// outbox is full are evicted rather than awaited.
	pub fn broadcast(&self, message: Arc<str>) {
		let _ = self.commands.send(HubCommand::Broadcast(message));
	}

	/// The number of currently-registered clients.
	#[must_use]
	pub fn client_count(&self) -> u64 {
		self.client_count.load(Ordering::Relaxed)
	}
}

async fn run(mut commands: mpsc::UnboundedReceiver<HubCommand>, source: Weak<Source>, client_count: Arc<AtomicU64>) {
	let mut clients: HashMap<ClientId, mpsc::Sender<Arc<str>>> = HashMap::new();

	while let Some(command) = commands.recv().await {
		match command {
			HubCommand::Register(id, outbox) => {
				let _ = clients.insert(id, outbox.clone());
				client_count.store(clients.len() as u64, Ordering::Relaxed);
				if let Some(source) = source.upgrade() {
					let _handle = tokio::spawn(async move {
						source.send_initial_data_to(&outbox).await;
					});
				}
			}
			HubCommand::Unregister(id) => {
				let _ = clients.remove(&id);
				client_count.store(clients.len() as u64, Ordering::Relaxed);
			}
			HubCommand::Broadcast(message) => {
				let mut dead = Vec::new();
				for (id, outbox) in &clients {
					if outbox.try_send(Arc::clone(&message)).is_err() {
						dead.push(*id);
					}
				}
				for id in dead {
					let _ = clients.remove(&id);
				}
				client_count.store(clients.len() as u64, Ordering::Relaxed);
			}
		}
	}
}
