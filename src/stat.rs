//! A node in the reactive statistic tree: owns its current value, its
//! children, and the machinery to (re)load, refresh, and notify listeners
//! of either.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::data::StatData;
use crate::errors::{LoaderError, RefreshError};
use crate::loader::Loader;

/// Capacity of a stat's listener broadcast channel. A listener that falls
/// this far behind misses old notifications rather than stalling refreshes.
const LISTENER_CHANNEL_CAPACITY: usize = 16;

#[derive(Default)]
struct StatState {
	data: Option<StatData>,
	children: IndexMap<String, Arc<Stat>>,
}

/// One node of the tree: a name, a loader that knows how to (re)populate
/// it, and the data/children pair that loader produces.
///
/// `data` and `children` are guarded together so a concurrent read (e.g.
/// [`Stat::snapshot`]) never observes one updated and the other stale.
pub struct Stat {
	/// This stat's name, also its key among its parent's children.
	pub name: String,
	/// Depth in the tree; the root is `0`.
	pub depth: usize,
	loader: Loader,
	state: RwLock<StatState>,
	listeners: broadcast::Sender<()>,
}

impl Stat {
	/// Builds an unloaded stat. Call [`Stat::load`] or [`Stat::reload`]
	/// before reading its data.
	#[must_use]
	pub fn new(name: String, depth: usize, loader: Loader) -> Arc<Self> {
		let (listeners, _) = broadcast::channel(LISTENER_CHANNEL_CAPACITY);
		Arc::new(Self { name, depth, loader, state: RwLock::new(StatState::default()), listeners })
	}

	/// Clears this stat's data and children. Does not touch its listeners:
	/// reloading is a value change, not a topology change its subscribers
	/// need to re-subscribe for.
	pub async fn reset(&self) {
		*self.state.write().await = StatState::default();
	}

	/// Loads this stat's value from its loader, then recursively loads each
	/// of its data points. Commits `data` and `children` together once the
	/// whole subtree has loaded, so readers never see a half-populated node.
	pub async fn load(self: &Arc<Self>) -> Result<(), LoaderError> {
		let data = self.loader.load(&self.name).await?;
		let names = self.loader.data_point_names().await?;

		let mut children = IndexMap::with_capacity(names.len());
		for child_name in &names {
			let child_loader = self.loader.derive_child(child_name);
			let child = Stat::new(child_name.clone(), self.depth + 1, child_loader);
			Box::pin(child.load()).await?;
			let _ = children.insert(child_name.clone(), child);
		}

		*self.state.write().await = StatState { data: Some(data), children };
		Ok(())
	}

	/// [`Stat::reset`] followed by [`Stat::load`].
	pub async fn reload(self: &Arc<Self>) -> Result<(), LoaderError> {
		self.reset().await;
		self.load().await
	}

	/// Re-fetches this stat's own value, holding the state lock for the
	/// duration so concurrent reads see either the old or the new value,
	/// never a tear.
	pub async fn refresh_data(&self) -> Result<(), RefreshError> {
		let mut state = self.state.write().await;
		match state.data.as_mut() {
			Some(data) => data.refresh(&self.loader).await,
			None => Ok(()),
		}
	}

	/// Refreshes every data point, in their configured order.
	pub async fn refresh_data_points(&self) -> Result<(), RefreshError> {
		let children: Vec<Arc<Stat>> = self.state.read().await.children.values().cloned().collect();
		for child in children {
			Box::pin(child.refresh()).await?;
		}
		Ok(())
	}

	/// [`Stat::refresh_data`] followed by [`Stat::refresh_data_points`].
	pub async fn refresh(&self) -> Result<(), RefreshError> {
		self.refresh_data().await?;
		self.refresh_data_points().await
	}

	/// The stat at `name` among this stat's data points, if any.
	pub async fn child(&self, name: &str) -> Option<Arc<Stat>> {
		self.state.read().await.children.get(name).cloned()
	}

	/// This stat's milestone-reachable field, if it's been loaded.
	pub async fn milestone_value(&self, field: &str) -> Option<f64> {
		self.state.read().await.data.as_ref().map(|data| data.milestone_value(field))
	}

	/// Subscribes to this stat's update notifications.
	#[must_use]
	pub fn register_listener(&self) -> broadcast::Receiver<()> {
		self.listeners.subscribe()
	}

	/// Notifies every current listener that this stat has a fresh value.
	/// A best-effort send: a listener with no receivers is a no-op.
	pub fn notify_listeners(&self) {
		let _ = self.listeners.send(());
	}

	/// Loads (if not already loaded) and spawns the debounced refresh loop
	/// that reacts to this stat's upstream update channel.
	pub async fn listen_for_updates(
		self: &Arc<Self>,
		min_delay: std::time::Duration,
		max_delay: std::time::Duration,
		errors: mpsc::UnboundedSender<RefreshError>,
	) -> Result<(), LoaderError> {
		self.reload().await?;
		let updates = self.loader.subscribe_updates();
		let stat = Arc::clone(self);
		let _handle = tokio::spawn(async move {
			crate::debounce::run(stat, updates, min_delay, max_delay, errors).await;
		});
		Ok(())
	}

	/// Builds a plain, serialisable snapshot of this stat and its subtree.
	/// A separate type rather than `impl Serialize for Stat` because
	/// reading this stat's guarded state is async and `Serialize` isn't.
	pub async fn snapshot(&self) -> StatSnapshot {
		let (data_json, children): (serde_json::Value, Vec<(String, Arc<Stat>)>) = {
			let state = self.state.read().await;
			let data_json = state.data.as_ref().map_or(serde_json::Value::Null, StatData::to_json);
			let children = state.children.iter().map(|(name, stat)| (name.clone(), Arc::clone(stat))).collect();
			(data_json, children)
		};

		let mut data_points = IndexMap::with_capacity(children.len());
		for (name, child) in children {
			let _ = data_points.insert(name, Box::pin(child.snapshot()).await);
		}

		StatSnapshot { name: self.name.clone(), data: data_json, data_points }
	}
}

/// A point-in-time, serialisable view of a [`Stat`] and its subtree.
#[derive(Debug, Serialize)]
pub struct StatSnapshot {
	/// The stat's name.
	pub name: String,
	/// The stat's current value, rendered in its variant's wire shape.
	pub data: serde_json::Value,
	/// This stat's data points, keyed by name.
	#[serde(rename = "dataPoints")]
	pub data_points: IndexMap<String, StatSnapshot>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::StatKey;
	use crate::loader::LeafLoader;
	use crate::upstream::MemoryStore;
	use std::collections::HashMap;

	fn single_value_stat(store: Arc<MemoryStore>, prefix: &str, name: &str) -> Arc<Stat> {
		let loader = Loader::SingleValue(LeafLoader::new(StatKey::new(prefix), store));
		Stat::new(name.to_owned(), 0, loader)
	}

	#[tokio::test]
	async fn load_populates_data_and_recurses_into_children() {
		let store = Arc::new(MemoryStore::new());
		store.set_int("p:stats:votes:data", 10);
		store.set_members("p:stats:votes:datapoints", vec!["ward-1".to_owned()]);
		store.set_int("p:stats:votes:datapoints:ward-1:data", 4);

		let stat = single_value_stat(store, "p:stats:votes", "votes");
		stat.load().await.unwrap();

		let snapshot = stat.snapshot().await;
		assert_eq!(snapshot.data, serde_json::json!({"votes": 10}));
		assert_eq!(snapshot.data_points.len(), 1);
		assert_eq!(snapshot.data_points["ward-1"].data, serde_json::json!({"ward-1": 4}));
	}

	#[tokio::test]
	async fn reload_replaces_stale_children() {
		let store = Arc::new(MemoryStore::new());
		store.set_int("p:stats:votes:data", 1);
		store.set_members("p:stats:votes:datapoints", vec!["a".to_owned()]);
		let stat = single_value_stat(store.clone(), "p:stats:votes", "votes");
		stat.load().await.unwrap();
		assert!(stat.child("a").await.is_some());

		store.set_members("p:stats:votes:datapoints", vec!["b".to_owned()]);
		stat.reload().await.unwrap();
		assert!(stat.child("a").await.is_none());
		assert!(stat.child("b").await.is_some());
	}

	#[tokio::test]
	async fn refresh_rereads_values_without_touching_the_child_set() {
		let store = Arc::new(MemoryStore::new());
		store.set_int("p:stats:votes:data", 1);
		let stat = single_value_stat(store.clone(), "p:stats:votes", "votes");
		stat.load().await.unwrap();

		store.set_int("p:stats:votes:data", 2);
		stat.refresh().await.unwrap();
		assert_eq!(stat.snapshot().await.data, serde_json::json!({"votes": 2}));
	}

	#[tokio::test]
	async fn listeners_are_notified_and_lagging_listeners_do_not_block() {
		let store = Arc::new(MemoryStore::new());
		let stat = single_value_stat(store, "p:stats:votes", "votes");
		stat.load().await.unwrap();
		let mut rx = stat.register_listener();
		stat.notify_listeners();
		rx.recv().await.unwrap();
	}

	#[tokio::test]
	async fn proportion_milestone_value_reads_through_the_loaded_data() {
		let store = Arc::new(MemoryStore::new());
		let mut seed = HashMap::new();
		let _ = seed.insert("current".to_owned(), 3);
		let _ = seed.insert("total".to_owned(), 12);
		store.set_map("p:stats:turnout:data", seed);
		let loader = Loader::Proportion(LeafLoader::new(StatKey::new("p:stats:turnout"), store));
		let stat = Stat::new("turnout".to_owned(), 0, loader);
		stat.load().await.unwrap();
		assert_eq!(stat.milestone_value("percentage").await, Some(25.0));
	}
}
