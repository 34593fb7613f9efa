//! Bucketed time-series data: either a whole-period histogram or a moving
//! window of recent buckets, depending on the configured [`Period`].

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::errors::RefreshError;
use crate::loader::TimedLoader;

/// How a single granularity of a timed stat is bucketed.
///
/// `cycles < 0` means a whole-period histogram spanning the source's
/// configured start/end time; `cycles >= 0` means a moving window holding
/// that many cycles plus the current one.
#[derive(Clone, Debug, Default)]
pub struct Period {
	pub(crate) granularity: i64,
	pub(crate) cycles: i64,
	pub(crate) bucket_keys: Vec<i64>,
	pub(crate) buckets: HashMap<i64, i64>,
}

/// A timed stat's data: the source's overall start/end time plus the one
/// [`Period`] this node (root or child) owns. The root holds
/// `Period::default()` (granularity `0`, no buckets); each child owns one
/// fully materialised period.
#[derive(Clone, Debug)]
pub struct TimedData {
	pub(crate) start_time: DateTime<Utc>,
	pub(crate) end_time: DateTime<Utc>,
	pub(crate) period: Period,
}

impl TimedData {
	pub(crate) async fn load(stat_name: &str, loader: &TimedLoader) -> Result<Self, crate::errors::LoaderError> {
		loader.load(stat_name).await
	}

	pub(crate) async fn refresh(&mut self, loader: &TimedLoader) -> Result<(), RefreshError> {
		if self.period.granularity == 0 {
			return Ok(());
		}
		let now = loader.clamped_now(self.end_time);
		let granularity = self.period.granularity;
		let current_bucket = now.timestamp().div_euclid(granularity);
		let previous_bucket = current_bucket.saturating_sub(1);
		let Some(&start_bucket) = self.period.bucket_keys.first() else {
			return Ok(());
		};

		if current_bucket >= start_bucket {
			let value = loader.fetch_bucket(current_bucket).await?;
			let _ = self.period.buckets.insert(current_bucket, value);
		}
		if previous_bucket >= start_bucket {
			let value = loader.fetch_bucket(previous_bucket).await?;
			let _ = self.period.buckets.insert(previous_bucket, value);
		}

		if self.period.cycles > 0 && self.period.buckets.len() as i64 > self.period.cycles.saturating_add(1) {
			if !self.period.bucket_keys.is_empty() {
				let oldest = self.period.bucket_keys.remove(0);
				let _ = self.period.buckets.remove(&oldest);
			}
			self.period.bucket_keys.push(current_bucket);
		}

		Ok(())
	}

	/// Timed data never exposes a milestone-reachable field.
	#[must_use]
	pub fn milestone_value(&self, _field: &str) -> f64 {
		0.0
	}
}

impl Serialize for TimedData {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		if self.period.granularity == 0 {
			return serializer.serialize_map(Some(0))?.end();
		}
		let mut map = serializer.serialize_map(Some(self.period.bucket_keys.len()))?;
		for key in &self.period.bucket_keys {
			let value = self.period.buckets.get(key).copied().unwrap_or(0);
			map.serialize_entry(&key.to_string(), &value)?;
		}
		map.end()
	}
}

/// Caps `now` at `end_time + 5 minutes`, the clamp the original uses so a
/// moving window doesn't keep advancing indefinitely after a source ends.
pub(crate) fn clamp_now(now: DateTime<Utc>, end_time: DateTime<Utc>) -> DateTime<Utc> {
	let cap = end_time + ChronoDuration::minutes(5);
	if now > cap { cap } else { now }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::StatKey;
	use crate::upstream::MemoryStore;
	use std::sync::Arc;

	fn make_loader(periods: Vec<crate::config::PeriodConfig>, is_leaf: bool) -> (TimedLoader, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::new());
		let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
		let end = DateTime::parse_from_rfc3339("2024-01-01T01:00:00Z").unwrap().with_timezone(&Utc);
		let loader = TimedLoader::new(StatKey::new("p:stats:turnout"), store.clone(), start, end, periods, is_leaf);
		(loader, store)
	}

	#[test]
	fn root_data_serialises_as_empty_object() {
		let data = TimedData { start_time: Utc::now(), end_time: Utc::now(), period: Period::default() };
		assert_eq!(serde_json::to_string(&data).unwrap(), "{}");
	}

	#[tokio::test]
	async fn whole_period_load_populates_every_bucket_in_range() {
		let periods = vec![crate::config::PeriodConfig { granularity: 60, cycles: -1 }];
		let (loader, store) = make_loader(periods, true);
		let mut seed = HashMap::new();
		let _ = seed.insert("1704067200".to_owned(), 3);
		store.set_map("p:stats:turnout:data", seed);
		let data = TimedData::load("60", &loader).await.unwrap();
		assert_eq!(data.period.granularity, 60);
		assert_eq!(data.period.buckets.get(&1_704_067_200), Some(&3));
	}

	#[tokio::test]
	async fn unmatched_child_name_yields_zero_granularity() {
		let periods = vec![crate::config::PeriodConfig { granularity: 60, cycles: -1 }];
		let (loader, _store) = make_loader(periods, true);
		let data = TimedData::load("not-a-period", &loader).await.unwrap();
		assert_eq!(data.period.granularity, 0);
	}

	#[test]
	fn clamp_now_caps_at_five_minutes_past_end() {
		let end = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
		let far_future = end + ChronoDuration::hours(1);
		assert_eq!(clamp_now(far_future, end), end + ChronoDuration::minutes(5));
		let within = end + ChronoDuration::minutes(1);
		assert_eq!(clamp_now(within, end), within);
	}
}
