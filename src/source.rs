//! A named publication unit: a statistic tree plus its milestone rules,
//! wired to a broadcast hub.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::{MilestoneGroupConfig, SourceConfig, StatConfig};
use crate::errors::{LoaderError, RefreshError};
use crate::hub::HubHandle;
use crate::key::StatKey;
use crate::loader::{LeafLoader, Loader, TimedLoader};
use crate::message::Message;
use crate::milestone::{Milestone, MilestoneCollection};
use crate::stat::Stat;
use crate::upstream::SharedStore;

/// How often a non-live source's stats are fully re-read from upstream,
/// independent of any update notifications.
const REFRESH_ALL_INTERVAL: Duration = Duration::from_secs(120);

/// A named bundle of stat groups and milestone collections, fanned out
/// through one [`HubHandle`].
pub struct Source {
	/// The source's name.
	pub name: String,
	/// Whether this source listens for live updates, as opposed to loading
	/// once and never refreshing reactively.
	pub is_live: bool,
	/// Group name to ordered stat keys, advertised to clients on connect.
	pub available: IndexMap<String, Vec<String>>,
	/// Group name to stat key to the stat itself.
	pub stats: IndexMap<String, IndexMap<String, Arc<Stat>>>,
	/// The milestone collections watching this source's stats.
	pub milestones: Vec<Arc<MilestoneCollection>>,
	/// The hub this source's updates and milestones are broadcast through.
	pub hub: HubHandle,
	updates_count: AtomicU64,
	milestones_count: AtomicU64,
}

impl Source {
	/// Builds a source's stat trees and milestone collections from `config`,
	/// wiring its hub to itself via a weak back-reference. A milestone
	/// collection whose anchor stat doesn't exist is silently dropped.
	#[must_use]
	pub fn from_config(store: &SharedStore, config: &SourceConfig) -> Arc<Self> {
		let mut available = IndexMap::new();
		let mut stats: IndexMap<String, IndexMap<String, Arc<Stat>>> = IndexMap::new();

		add_group(&mut available, &mut stats, "proportion", &config.stats.proportion, config, store, |stat_key, _| {
			stat_key.to_owned()
		});
		add_group(&mut available, &mut stats, "rolling", &config.stats.rolling, config, store, |stat_key, cfg| {
			format!("{}:{stat_key}", cfg.period.as_deref().unwrap_or_default())
		});
		add_group(&mut available, &mut stats, "timed", &config.stats.timed, config, store, |stat_key, _| {
			stat_key.to_owned()
		});
		add_group(&mut available, &mut stats, "other", &config.stats.other, config, store, |stat_key, cfg| {
			cfg.period.as_deref().map_or_else(|| stat_key.to_owned(), |period| format!("{period}:{stat_key}"))
		});

		let milestones = build_milestones(&config.milestones, &stats);

		Arc::new_cyclic(|weak: &Weak<Self>| Self {
			name: config.name.clone(),
			is_live: config.is_live,
			available,
			stats,
			milestones,
			hub: HubHandle::spawn(Weak::clone(weak)),
			updates_count: AtomicU64::new(0),
			milestones_count: AtomicU64::new(0),
		})
	}

	/// Starts this source's reactive machinery: per-stat load/listen tasks
	/// that broadcast on every update, and per-collection milestone
	/// evaluation. `errors` receives refresh/encode failures; the caller is
	/// expected to log them.
	pub async fn publish(
		self: &Arc<Self>,
		debounce_min: Duration,
		debounce_max: Duration,
		errors: mpsc::UnboundedSender<RefreshError>,
	) -> Result<(), LoaderError> {
		for (group, group_stats) in &self.stats {
			for (stat_key, stat) in group_stats {
				if self.is_live {
					stat.listen_for_updates(debounce_min, debounce_max, errors.clone()).await?;
				} else {
					stat.reload().await?;
				}

				let source = Arc::clone(self);
				let group = group.clone();
				let stat_key = stat_key.clone();
				let stat = Arc::clone(stat);
				let mut updates = stat.register_listener();
				let _handle = tokio::spawn(async move {
					loop {
						match updates.recv().await {
							Ok(()) => source.broadcast_stat(&group, &stat_key, &stat),
							Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
							Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
						}
					}
				});
			}
		}

		for collection in &self.milestones {
			let source = Arc::clone(self);
			let (tx, mut rx) = mpsc::unbounded_channel();
			Arc::clone(collection).publish(tx).await;
			let _handle = tokio::spawn(async move {
				while let Some(milestone) = rx.recv().await {
					source.broadcast_milestone(&milestone);
				}
			});
		}

		Ok(())
	}

	fn broadcast_stat(&self, group: &str, stat_key: &str, stat: &Arc<Stat>) {
		self.updates_count.fetch_add(1, Ordering::Relaxed);
		let stat_key = stat_key.to_owned();
		let group = group.to_owned();
		let stat = Arc::clone(stat);
		let hub = self.hub.clone();
		let _handle = tokio::spawn(async move {
			let snapshot = stat.snapshot().await;
			let message = Message::new(format!("stats:{group}:{stat_key}"), snapshot);
			match message.encode() {
				Ok(encoded) => hub.broadcast(Arc::from(encoded)),
				Err(err) => warn!(%err, "failed to encode stat snapshot"),
			}
		});
	}

	fn broadcast_milestone(&self, milestone: &Arc<Milestone>) {
		self.milestones_count.fetch_add(1, Ordering::Relaxed);
		let message = Message::new("milestone", milestone.as_ref());
		match message.encode() {
			Ok(encoded) => self.hub.broadcast(Arc::from(encoded)),
			Err(err) => warn!(%err, "failed to encode milestone"),
		}
	}

	/// Refreshes every stat in this source and notifies its listeners,
	/// logging (rather than propagating) any individual failure.
	pub async fn refresh_all(&self) {
		for group_stats in self.stats.values() {
			for stat in group_stats.values() {
				match stat.refresh().await {
					Ok(()) => stat.notify_listeners(),
					Err(err) => warn!(%err, stat = %stat.name, "periodic refresh failed"),
				}
			}
		}
	}

	/// Spawns the periodic full-refresh loop. A no-op for live sources,
	/// which already refresh reactively.
	pub fn spawn_periodic_refresh(self: &Arc<Self>) {
		if self.is_live {
			return;
		}
		let source = Arc::clone(self);
		let _handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval(REFRESH_ALL_INTERVAL);
			loop {
				let _ = interval.tick().await;
				source.refresh_all().await;
			}
		});
	}

	/// Sends `outbox` the `available` catalogue immediately, then after a
	/// short delay one `stats:*` message per stat, giving the client time to
	/// install per-stat handlers first.
	pub async fn send_initial_data_to(&self, outbox: &mpsc::Sender<Arc<str>>) {
		let available = Message::new("available", &self.available);
		if let Ok(encoded) = available.encode() {
			let _ = outbox.send(Arc::from(encoded)).await;
		}

		tokio::time::sleep(Duration::from_millis(100)).await;

		for (group, group_stats) in &self.stats {
			for (stat_key, stat) in group_stats {
				let snapshot = stat.snapshot().await;
				let message = Message::new(format!("stats:{group}:{stat_key}"), snapshot);
				if let Ok(encoded) = message.encode() {
					let _ = outbox.send(Arc::from(encoded)).await;
				}
			}
		}
	}

	/// The number of stat updates broadcast since the last pop, resetting it
	/// to zero.
	pub fn pop_updates_count(&self) -> u64 {
		self.updates_count.swap(0, Ordering::Relaxed)
	}

	/// The number of milestones fired since the last pop, resetting it to
	/// zero.
	pub fn pop_milestones_count(&self) -> u64 {
		self.milestones_count.swap(0, Ordering::Relaxed)
	}

	/// The number of clients currently connected to this source's hub.
	#[must_use]
	pub fn client_count(&self) -> u64 {
		self.hub.client_count()
	}
}

fn stat_key_prefix(source_prefix: &str, period: Option<&str>, name: &str) -> StatKey {
	match period {
		Some(period) => StatKey::new(format!("{source_prefix}:rolling:{period}:stats:{name}")),
		None => StatKey::new(format!("{source_prefix}:stats:{name}")),
	}
}

fn build_loader(data_type: &str, key: StatKey, store: SharedStore, config: &SourceConfig) -> Loader {
	match data_type {
		"generic" => Loader::Generic(LeafLoader::new(key, store)),
		"rolling" => Loader::Rolling(LeafLoader::new(key, store)),
		"single_value" => Loader::SingleValue(LeafLoader::new(key, store)),
		"timed" => Loader::Timed(TimedLoader::new(key, store, config.start_time, config.end_time, config.timed_periods.clone(), false)),
		_ => Loader::Proportion(LeafLoader::new(key, store)),
	}
}

#[allow(clippy::too_many_arguments, reason = "mirrors the grouping the original config loader performs per stat group")]
fn add_group(
	available: &mut IndexMap<String, Vec<String>>,
	stats: &mut IndexMap<String, IndexMap<String, Arc<Stat>>>,
	group: &str,
	stat_configs: &[StatConfig],
	source_config: &SourceConfig,
	store: &SharedStore,
	available_key: impl Fn(&str, &StatConfig) -> String,
) {
	if stat_configs.is_empty() {
		return;
	}
	let mut group_stats = IndexMap::new();
	let mut group_available = Vec::new();

	for stat_config in stat_configs {
		let data_type = stat_config.data_type.as_deref().unwrap_or(group);
		let key = stat_key_prefix(&source_config.prefix, stat_config.period.as_deref(), &stat_config.name);
		let loader = build_loader(data_type, key, Arc::clone(store), source_config);
		let stat = Stat::new(stat_config.name.clone(), 0, loader);
		let stat_key = available_key(&stat_config.name, stat_config);
		group_available.push(stat_key.clone());
		let _ = group_stats.insert(stat_key, stat);
	}

	let _ = available.insert(group.to_owned(), group_available);
	let _ = stats.insert(group.to_owned(), group_stats);
}

fn build_milestones(
	configs: &[MilestoneGroupConfig],
	stats: &IndexMap<String, IndexMap<String, Arc<Stat>>>,
) -> Vec<Arc<MilestoneCollection>> {
	let mut collections = Vec::with_capacity(configs.len());
	for config in configs {
		let Some(anchor) = stats.get(&config.group).and_then(|group| group.get(&config.stat)) else {
			continue;
		};
		let milestones = config
			.milestones
			.iter()
			.map(|milestone| {
				Arc::new(Milestone::new(
					milestone.name.clone(),
					milestone.data_point_path.clone(),
					milestone.field.clone(),
					milestone.target,
					milestone.comparator,
					milestone.message.clone(),
				))
			})
			.collect();
		collections.push(Arc::new(MilestoneCollection {
			name: config.name.clone(),
			anchor: Arc::clone(anchor),
			milestones,
		}));
	}
	collections
}
