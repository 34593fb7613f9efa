//! Loaders bind a [`crate::key::StatKey`] and an [`UpstreamStore`] to a data
//! variant, and know how to derive the loader for a child data point.
//!
//! This collapses the three loader roles the data model names (data loader,
//! data-point loader, update listener) into one tagged [`Loader`] enum per
//! variant, each owning an explicit `derive_child` rather than the
//! reflection-based cloning the original relies on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::config::PeriodConfig;
use crate::data::timed::{clamp_now, Period};
use crate::data::{GenericData, ProportionData, RollingData, SingleValueData, StatData, TimedData};
use crate::errors::{LoaderError, UpstreamError};
use crate::key::StatKey;
use crate::upstream::SharedStore;

/// One tick of the background ticker a zero-granularity [`TimedLoader`]
/// spawns.
const TICKER_INTERVAL: Duration = Duration::from_secs(1);

/// The loader bound to a stat, tagged by the data variant it produces.
#[derive(Clone)]
pub enum Loader {
	/// Produces [`SingleValueData`].
	SingleValue(LeafLoader),
	/// Produces [`GenericData`].
	Generic(LeafLoader),
	/// Produces [`ProportionData`].
	Proportion(LeafLoader),
	/// Produces [`RollingData`].
	Rolling(LeafLoader),
	/// Produces [`TimedData`].
	Timed(TimedLoader),
}

impl Loader {
	/// Fetches this stat's initial value and, for non-timed variants,
	/// resolves the configured data-point names too (timed loaders resolve
	/// names separately via [`Loader::data_point_names`]).
	pub async fn load(&self, stat_name: &str) -> Result<StatData, LoaderError> {
		match self {
			Self::SingleValue(leaf) => Ok(StatData::SingleValue(SingleValueData::load(stat_name, leaf).await?)),
			Self::Generic(leaf) => Ok(StatData::Generic(GenericData::load(leaf).await?)),
			Self::Proportion(leaf) => Ok(StatData::Proportion(ProportionData::load(leaf).await?)),
			Self::Rolling(leaf) => Ok(StatData::Rolling(RollingData::load(leaf).await?)),
			Self::Timed(timed) => Ok(StatData::Timed(TimedData::load(stat_name, timed).await?)),
		}
	}

	/// The names of this stat's data points (empty once the tree bottoms
	/// out, terminating recursion).
	pub async fn data_point_names(&self) -> Result<Vec<String>, LoaderError> {
		match self {
			Self::SingleValue(leaf) | Self::Generic(leaf) | Self::Proportion(leaf) | Self::Rolling(leaf) => {
				leaf.data_point_names().await
			}
			Self::Timed(timed) => Ok(timed.data_point_names()),
		}
	}

	/// Derives the loader for the data point named `name`.
	#[must_use]
	pub fn derive_child(&self, name: &str) -> Self {
		match self {
			Self::SingleValue(leaf) => Self::SingleValue(leaf.child(name)),
			Self::Generic(leaf) => Self::Generic(leaf.child(name)),
			Self::Proportion(leaf) => Self::Proportion(leaf.child(name)),
			Self::Rolling(leaf) => Self::Rolling(leaf.child(name)),
			Self::Timed(timed) => Self::Timed(timed.derive_child(name)),
		}
	}

	/// Subscribes to this stat's update-notification channel.
	#[must_use]
	pub fn subscribe_updates(&self) -> broadcast::Receiver<()> {
		match self {
			Self::SingleValue(leaf) | Self::Generic(leaf) | Self::Proportion(leaf) | Self::Rolling(leaf) => {
				leaf.store.subscribe(&leaf.key.make(&["updates"]))
			}
			Self::Timed(timed) => timed.store.subscribe(&timed.key.make(&["updates"])),
		}
	}
}

/// The loader shared by the four non-timed data variants: a key prefix and
/// a store handle, nothing more, since all four fetch from `<prefix>:data`
/// and enumerate children via `<prefix>:datapoints`.
#[derive(Clone)]
pub struct LeafLoader {
	key: StatKey,
	store: SharedStore,
}

impl LeafLoader {
	/// Builds a loader rooted at `key`.
	#[must_use]
	pub fn new(key: StatKey, store: SharedStore) -> Self {
		Self { key, store }
	}

	pub(crate) async fn fetch_int(&self, suffix: &str) -> Result<i64, UpstreamError> {
		self.store.get_int(&self.key.make(&[suffix])).await
	}

	pub(crate) async fn fetch_map(&self, suffix: &str) -> Result<HashMap<String, i64>, UpstreamError> {
		self.store.get_map(&self.key.make(&[suffix])).await
	}

	pub(crate) async fn fetch_map_fields(&self, suffix: &str, fields: &[&str]) -> Result<Vec<i64>, UpstreamError> {
		self.store.get_map_fields(&self.key.make(&[suffix]), fields).await
	}

	async fn data_point_names(&self) -> Result<Vec<String>, LoaderError> {
		Ok(self.store.get_members(&self.key.make(&["datapoints"])).await?)
	}

	/// Derives the loader for the data point named `name`, under
	/// `<prefix>:datapoints:<name>`.
	#[must_use]
	pub fn child(&self, name: &str) -> Self {
		Self { key: self.key.child(name), store: Arc::clone(&self.store) }
	}
}

/// The loader for a timed stat, either the zero-granularity root (`is_leaf
/// = false`) or one fully materialised period (`is_leaf = true`).
#[derive(Clone)]
pub struct TimedLoader {
	key: StatKey,
	store: SharedStore,
	start_time: DateTime<Utc>,
	end_time: DateTime<Utc>,
	periods: Vec<PeriodConfig>,
	is_leaf: bool,
}

impl TimedLoader {
	/// Builds a loader rooted at `key`. `is_leaf` distinguishes a resolved
	/// per-period child from the zero-granularity parent.
	#[must_use]
	pub fn new(
		key: StatKey,
		store: SharedStore,
		start_time: DateTime<Utc>,
		end_time: DateTime<Utc>,
		periods: Vec<PeriodConfig>,
		is_leaf: bool,
	) -> Self {
		Self { key, store, start_time, end_time, periods, is_leaf }
	}

	pub(crate) fn clamped_now(&self, end_time: DateTime<Utc>) -> DateTime<Utc> {
		clamp_now(Utc::now(), end_time)
	}

	pub(crate) async fn fetch_bucket(&self, bucket: i64) -> Result<i64, UpstreamError> {
		let field = bucket.to_string();
		let values = self.store.get_map_fields(&self.key.make(&["data"]), &[field.as_str()]).await?;
		Ok(values.first().copied().unwrap_or(0))
	}

	pub(crate) async fn load(&self, stat_name: &str) -> Result<TimedData, LoaderError> {
		if !self.is_leaf {
			self.spawn_ticker();
			return Ok(TimedData { start_time: self.start_time, end_time: self.end_time, period: Period::default() });
		}

		let Some(cfg) = self.periods.iter().find(|cfg| cfg.granularity.to_string() == stat_name) else {
			return Ok(TimedData { start_time: self.start_time, end_time: self.end_time, period: Period::default() });
		};

		let now = self.clamped_now(self.end_time);
		let granularity = cfg.granularity;
		let (start_bucket, end_bucket) = if cfg.cycles < 0 {
			let start = self.start_time.timestamp().div_euclid(granularity);
			let end = (self.end_time + chrono::Duration::hours(1)).timestamp().div_euclid(granularity);
			(start, end)
		} else {
			let end = now.timestamp().div_euclid(granularity);
			(end.saturating_sub(cfg.cycles), end)
		};

		let bucket_keys: Vec<i64> = (start_bucket..=end_bucket).collect();
		let mut buckets: HashMap<i64, i64> = bucket_keys.iter().map(|key| (*key, 0)).collect();

		if cfg.cycles < 0 {
			let data = self.store.get_map(&self.key.make(&["data"])).await?;
			for key in &bucket_keys {
				if let Some(value) = data.get(&key.to_string()) {
					let _ = buckets.insert(*key, *value);
				}
			}
		} else {
			let fields: Vec<String> = bucket_keys.iter().map(ToString::to_string).collect();
			let field_refs: Vec<&str> = fields.iter().map(String::as_str).collect();
			let values = self.store.get_map_fields(&self.key.make(&["data"]), &field_refs).await?;
			for (key, value) in bucket_keys.iter().zip(values) {
				let _ = buckets.insert(*key, value);
			}
		}

		let period = Period { granularity, cycles: cfg.cycles, bucket_keys, buckets };
		Ok(TimedData { start_time: self.start_time, end_time: self.end_time, period })
	}

	/// The configured granularities, as data-point names, if this is the
	/// zero-granularity root; empty otherwise (a leaf has no further
	/// children).
	#[must_use]
	fn data_point_names(&self) -> Vec<String> {
		if self.is_leaf {
			Vec::new()
		} else {
			self.periods.iter().map(|cfg| cfg.granularity.to_string()).collect()
		}
	}

	/// Derives the loader for the child named `name`, one level down and
	/// marked as a leaf.
	#[must_use]
	fn derive_child(&self, name: &str) -> Self {
		Self {
			key: self.key.child(name),
			store: Arc::clone(&self.store),
			start_time: self.start_time,
			end_time: self.end_time,
			periods: self.periods.clone(),
			is_leaf: true,
		}
	}

	/// Spawns the background ticker that publishes an update notification
	/// whenever a moving-window period crosses into a new bucket, so the
	/// tree re-pulls fresh data without an explicit upstream write.
	fn spawn_ticker(&self) {
		let store = Arc::clone(&self.store);
		let key = self.key.clone();
		let periods = self.periods.clone();
		let end_time = self.end_time;
		let _handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval(TICKER_INTERVAL);
			loop {
				let _ = interval.tick().await;
				let now = clamp_now(Utc::now(), end_time);
				if now >= end_time + chrono::Duration::minutes(5) {
					return;
				}
				let crossed_a_bucket =
					periods.iter().any(|cfg| cfg.cycles > 0 && now.timestamp().rem_euclid(cfg.granularity) == 0);
				if crossed_a_bucket {
					store.publish(&key.make(&["updates"]));
				}
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::upstream::MemoryStore;

	#[tokio::test]
	async fn leaf_loader_derives_children_under_datapoints() {
		let store: SharedStore = Arc::new(MemoryStore::new());
		let loader = LeafLoader::new(StatKey::new("p:stats:turnout"), store);
		let child = loader.child("ward-1");
		assert_eq!(child.key.as_str(), "p:stats:turnout:datapoints:ward-1");
	}

	#[tokio::test]
	async fn timed_root_has_no_data_points_once_resolved_as_leaf() {
		let store: SharedStore = Arc::new(MemoryStore::new());
		let now = Utc::now();
		let root =
			TimedLoader::new(StatKey::new("p:stats:votes"), store, now, now, vec![PeriodConfig { granularity: 60, cycles: -1 }], false);
		assert_eq!(root.data_point_names(), vec!["60".to_owned()]);
		let child = root.derive_child("60");
		assert!(child.data_point_names().is_empty());
	}
}
