//! The upstream KV + pub/sub contract that loaders and the ticker depend on.
//!
//! A production implementation (a pooled connection to a real store) is an
//! external collaborator; this module defines the trait boundary plus an
//! in-memory implementation used by the CLIs and the test suite.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::errors::UpstreamError;

/// Broadcast channel capacity for per-key update notifications.
const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// The narrow contract the stat tree needs from whatever backs it: integer
/// and map reads, set-membership reads, and an update-notification pub/sub.
///
/// Missing-key reads resolve to zero values rather than an error, matching
/// the upstream store's documented contract.
#[async_trait]
pub trait UpstreamStore: Send + Sync {
	/// Reads a single integer value, or `0` if the key is absent.
	async fn get_int(&self, key: &str) -> Result<i64, UpstreamError>;

	/// Reads an entire hash as a string-to-integer map.
	async fn get_map(&self, key: &str) -> Result<HashMap<String, i64>, UpstreamError>;

	/// Reads specific fields of a hash, in the order given. Missing fields
	/// resolve to `0`.
	async fn get_map_fields(&self, key: &str, fields: &[&str]) -> Result<Vec<i64>, UpstreamError>;

	/// Reads the members of a set.
	async fn get_members(&self, key: &str) -> Result<Vec<String>, UpstreamError>;

	/// Subscribes to update notifications for `channel`. A lagging receiver
	/// silently drops old notifications rather than blocking the publisher.
	fn subscribe(&self, channel: &str) -> broadcast::Receiver<()>;

	/// Publishes an update notification on `channel`. Best-effort: a
	/// channel with no subscribers is a no-op.
	fn publish(&self, channel: &str);
}

#[derive(Clone, Debug, Default)]
enum StoredValue {
	#[default]
	Missing,
	Int(i64),
	Map(HashMap<String, i64>),
	Members(Vec<String>),
}

/// An in-memory [`UpstreamStore`], used by the CLIs as a default backing
/// store and by the test suite to script upstream behaviour deterministically.
#[derive(Default)]
pub struct MemoryStore {
	values: Mutex<HashMap<String, StoredValue>>,
	channels: Mutex<HashMap<String, broadcast::Sender<()>>>,
}

impl MemoryStore {
	/// Creates an empty store.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Seeds an integer value at `key`.
	pub fn set_int(&self, key: impl Into<String>, value: i64) {
		let _ = self.values.lock().insert(key.into(), StoredValue::Int(value));
	}

	/// Seeds a hash value at `key`.
	pub fn set_map(&self, key: impl Into<String>, value: HashMap<String, i64>) {
		let _ = self.values.lock().insert(key.into(), StoredValue::Map(value));
	}

	/// Seeds a set value at `key`.
	pub fn set_members(&self, key: impl Into<String>, value: Vec<String>) {
		let _ = self.values.lock().insert(key.into(), StoredValue::Members(value));
	}

	fn sender_for(&self, channel: &str) -> broadcast::Sender<()> {
		self.channels
			.lock()
			.entry(channel.to_owned())
			.or_insert_with(|| broadcast::channel(UPDATE_CHANNEL_CAPACITY).0)
			.clone()
	}
}

#[async_trait]
impl UpstreamStore for MemoryStore {
	async fn get_int(&self, key: &str) -> Result<i64, UpstreamError> {
		match self.values.lock().get(key) {
			Some(StoredValue::Int(value)) => Ok(*value),
			Some(StoredValue::Missing) | None => Ok(0),
			Some(_) => Err(UpstreamError::UnexpectedShape(key.to_owned())),
		}
	}

	async fn get_map(&self, key: &str) -> Result<HashMap<String, i64>, UpstreamError> {
		match self.values.lock().get(key) {
			Some(StoredValue::Map(value)) => Ok(value.clone()),
			Some(StoredValue::Missing) | None => Ok(HashMap::new()),
			Some(_) => Err(UpstreamError::UnexpectedShape(key.to_owned())),
		}
	}

	async fn get_map_fields(&self, key: &str, fields: &[&str]) -> Result<Vec<i64>, UpstreamError> {
		let map = self.get_map(key).await?;
		Ok(fields.iter().map(|field| map.get(*field).copied().unwrap_or(0)).collect())
	}

	async fn get_members(&self, key: &str) -> Result<Vec<String>, UpstreamError> {
		match self.values.lock().get(key) {
			Some(StoredValue::Members(value)) => Ok(value.clone()),
			Some(StoredValue::Missing) | None => Ok(Vec::new()),
			Some(_) => Err(UpstreamError::UnexpectedShape(key.to_owned())),
		}
	}

	fn subscribe(&self, channel: &str) -> broadcast::Receiver<()> {
		self.sender_for(channel).subscribe()
	}

	fn publish(&self, channel: &str) {
		let _ = self.sender_for(channel).send(());
	}
}

/// A shared handle to an upstream store, the form every loader holds.
pub type SharedStore = Arc<dyn UpstreamStore>;

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn missing_keys_resolve_to_zero_values() {
		let store = MemoryStore::new();
		assert_eq!(store.get_int("nope").await.unwrap(), 0);
		assert!(store.get_map("nope").await.unwrap().is_empty());
		assert!(store.get_members("nope").await.unwrap().is_empty());
		assert_eq!(store.get_map_fields("nope", &["a", "b"]).await.unwrap(), vec![0, 0]);
	}

	#[tokio::test]
	async fn seeded_values_round_trip() {
		let store = MemoryStore::new();
		store.set_int("k:data", 42);
		assert_eq!(store.get_int("k:data").await.unwrap(), 42);

		let mut map = HashMap::new();
		let _ = map.insert("current".to_owned(), 3);
		let _ = map.insert("total".to_owned(), 10);
		store.set_map("k:data", map);
		assert_eq!(store.get_map_fields("k:data", &["current", "total"]).await.unwrap(), vec![3, 10]);
	}

	#[tokio::test]
	async fn publish_wakes_subscribers_but_is_a_no_op_without_them() {
		let store = MemoryStore::new();
		store.publish("k:updates");
		let mut rx = store.subscribe("k:updates");
		store.publish("k:updates");
		rx.recv().await.expect("subscriber should observe the publish");
	}
}
