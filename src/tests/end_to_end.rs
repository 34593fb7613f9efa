//! Scenario tests combining several modules, each modelled on one of the
//! literal walkthroughs a reviewer would use to sanity-check this crate.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use crate::config::PeriodConfig;
use crate::data::timed::TimedData;
use crate::debounce;
use crate::hub::{HubHandle, CLIENT_OUTBOX_CAPACITY};
use crate::key::StatKey;
use crate::loader::{LeafLoader, Loader, TimedLoader};
use crate::milestone::{Comparator, Milestone};
use crate::stat::Stat;
use crate::upstream::MemoryStore;

fn proportion_stat(store: Arc<MemoryStore>, current: i64, total: i64) -> Arc<Stat> {
	let mut seed = HashMap::new();
	let _ = seed.insert("current".to_owned(), current);
	let _ = seed.insert("total".to_owned(), total);
	store.set_map("src:stats:vote:data", seed);
	let loader = Loader::Proportion(LeafLoader::new(StatKey::new("src:stats:vote"), store));
	Stat::new("vote".to_owned(), 0, loader)
}

/// Scenario 1: a non-live proportion stat's snapshot matches its upstream
/// hash exactly, with no data points.
#[tokio::test]
async fn proportion_load_produces_the_documented_snapshot() {
	let store = Arc::new(MemoryStore::new());
	let stat = proportion_stat(store, 3, 10);
	stat.load().await.unwrap();

	let snapshot = serde_json::to_value(stat.snapshot().await).unwrap();
	assert_eq!(snapshot["name"], "vote");
	assert_eq!(snapshot["data"]["current"], 3);
	assert_eq!(snapshot["data"]["total"], 10);
	assert_eq!(snapshot["data"]["proportion"], 0.3);
	assert_eq!(snapshot["data"]["percentage"], 30.0);
	assert_eq!(snapshot["dataPoints"], serde_json::json!({}));
}

/// Scenario 2: a milestone fires exactly once no matter how many times it's
/// re-evaluated afterwards.
#[tokio::test]
async fn milestone_fires_once_across_many_notifications() {
	let store = Arc::new(MemoryStore::new());
	let stat = proportion_stat(store, 3, 10);
	stat.load().await.unwrap();

	let milestone = Milestone::new("quarter".to_owned(), vec![], "percentage".to_owned(), 25.0, Comparator::Ge, "25%!".to_owned());

	assert!(milestone.evaluate(&stat).await);
	for _ in 0..100 {
		assert!(!milestone.evaluate(&stat).await);
	}
}

/// Scenario 3: a rolling stat's shape includes peak alongside the
/// proportion fields.
#[tokio::test]
async fn rolling_shape_includes_peak_ratios() {
	let store = Arc::new(MemoryStore::new());
	let mut seed = HashMap::new();
	let _ = seed.insert("current".to_owned(), 5);
	let _ = seed.insert("total".to_owned(), 100);
	let _ = seed.insert("peak".to_owned(), 7);
	store.set_map("src:stats:attendance:data", seed);
	let loader = Loader::Rolling(LeafLoader::new(StatKey::new("src:stats:attendance"), store));
	let stat = Stat::new("attendance".to_owned(), 0, loader);
	stat.load().await.unwrap();

	let snapshot = serde_json::to_value(stat.snapshot().await).unwrap();
	assert_eq!(snapshot["data"]["proportion"], 0.05);
	assert_eq!(snapshot["data"]["percentage"], 5.0);
	assert_eq!(snapshot["data"]["peakProportion"], 0.07);
	assert_eq!(snapshot["data"]["peakPercentage"], 7.0);
}

/// Scenario 4: a moving-window timed period keeps exactly `cycles + 1`
/// buckets, dropping the oldest and appending the new one as the clock
/// advances by one granularity.
#[tokio::test]
async fn timed_window_slides_by_one_bucket_per_refresh() {
	let store = Arc::new(MemoryStore::new());
	let start_time = Utc::now() - chrono::Duration::hours(2);
	let end_time = Utc::now() - chrono::Duration::hours(1);
	let periods = vec![PeriodConfig { granularity: 60, cycles: 5 }];
	let loader = TimedLoader::new(StatKey::new("src:stats:votes"), store, start_time, end_time, periods, true);

	let mut data = TimedData::load("60", &loader).await.unwrap();
	assert_eq!(data.period.bucket_keys.len(), 6);
	let original_oldest = data.period.bucket_keys[0];
	let original_newest = *data.period.bucket_keys.last().unwrap();

	data.end_time = data.end_time + chrono::Duration::seconds(60);
	data.refresh(&loader).await.unwrap();

	assert_eq!(data.period.bucket_keys.len(), 6);
	assert!(!data.period.bucket_keys.contains(&original_oldest));
	assert_eq!(*data.period.bucket_keys.last().unwrap(), original_newest + 1);
}

/// Scenario 5: a client whose outbox is never drained is evicted once it's
/// full, without blocking delivery to anyone else.
#[tokio::test]
async fn a_full_outbox_is_evicted_without_blocking_other_clients() {
	let hub = HubHandle::spawn(Weak::new());

	let (slow_tx, _slow_rx) = mpsc::channel(CLIENT_OUTBOX_CAPACITY);
	let _slow_id = hub.register(slow_tx);
	let (fast_tx, mut fast_rx) = mpsc::channel(CLIENT_OUTBOX_CAPACITY);
	hub.register(fast_tx);
	tokio::task::yield_now().await;

	for n in 0..(CLIENT_OUTBOX_CAPACITY + 1) {
		hub.broadcast(Arc::from(format!("message-{n}")));
	}
	tokio::task::yield_now().await;

	assert_eq!(hub.client_count(), 1);
	hub.broadcast(Arc::from("still-alive"));
	let last = timeout(Duration::from_secs(1), async {
		let mut last = None;
		while let Ok(Some(msg)) = timeout(Duration::from_millis(50), fast_rx.recv()).await {
			last = Some(msg);
		}
		last
	})
	.await
	.unwrap();
	assert_eq!(last.as_deref(), Some("still-alive"));
}

/// Scenario 6: sustained updates keep refreshing at roughly `maxDelay`
/// cadence, and the last burst still produces one final refresh once the
/// stream goes quiet.
#[tokio::test(start_paused = true)]
async fn sustained_bursts_refresh_periodically_then_settle_once_quiet() {
	let store = Arc::new(MemoryStore::new());
	let stat = proportion_stat(store, 1, 10);
	stat.load().await.unwrap();

	let (tx, rx) = broadcast::channel(1024);
	let (err_tx, mut err_rx) = mpsc::unbounded_channel();
	let mut notified = stat.register_listener();
	let handle = tokio::spawn(debounce::run(
		Arc::clone(&stat),
		rx,
		Duration::from_millis(50),
		Duration::from_millis(500),
		err_tx,
	));

	let mut refreshes = 0_u32;
	for _ in 0..200 {
		tx.send(()).unwrap();
		tokio::time::advance(Duration::from_millis(10)).await;
		while notified.try_recv().is_ok() {
			refreshes += 1;
		}
	}

	// Quiet period: the trailing burst should still produce one last refresh.
	tokio::time::advance(Duration::from_millis(100)).await;
	while notified.try_recv().is_ok() {
		refreshes += 1;
	}

	assert!(refreshes >= 3, "expected several refreshes across a 2s sustained burst, got {refreshes}");
	assert!(err_rx.try_recv().is_err());
	handle.abort();
}
