//! Coalesces a burst of update notifications into a single refresh: a
//! refresh fires once the stream goes quiet for `min_delay`, or after
//! `max_delay` of sustained updates, whichever comes first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::errors::RefreshError;
use crate::stat::Stat;

/// Runs the debounce state machine for `stat` until its update channel
/// closes or a refresh fails. A `RefreshError` is reported to `errors` and
/// ends the loop; per-deployment policy may choose to restart it.
pub async fn run(
	stat: Arc<Stat>,
	mut updates: broadcast::Receiver<()>,
	min_delay: Duration,
	max_delay: Duration,
	errors: mpsc::UnboundedSender<RefreshError>,
) {
	let mut min_deadline: Option<Instant> = None;
	let mut max_deadline: Option<Instant> = None;

	loop {
		let min_sleep = async {
			match min_deadline {
				Some(deadline) => tokio::time::sleep_until(deadline).await,
				None => std::future::pending().await,
			}
		};
		let max_sleep = async {
			match max_deadline {
				Some(deadline) => tokio::time::sleep_until(deadline).await,
				None => std::future::pending().await,
			}
		};

		tokio::select! {
			biased;

			received = updates.recv() => {
				match received {
					Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
						let now = Instant::now();
						min_deadline = Some(now + min_delay);
						if max_deadline.is_none() {
							max_deadline = Some(now + max_delay);
						}
					}
					Err(broadcast::error::RecvError::Closed) => return,
				}
			}

			() = min_sleep => {
				min_deadline = None;
				max_deadline = None;
				if !refresh_and_notify(&stat, &errors).await {
					return;
				}
			}

			() = max_sleep => {
				min_deadline = None;
				max_deadline = None;
				if !refresh_and_notify(&stat, &errors).await {
					return;
				}
			}
		}
	}
}

/// Refreshes `stat` and notifies its listeners on success. Returns `false`
/// (and reports the error) if the refresh failed, signalling the caller to
/// stop the loop.
async fn refresh_and_notify(stat: &Arc<Stat>, errors: &mpsc::UnboundedSender<RefreshError>) -> bool {
	match stat.refresh().await {
		Ok(()) => {
			stat.notify_listeners();
			true
		}
		Err(err) => {
			let _ = errors.send(err);
			false
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::StatKey;
	use crate::loader::{LeafLoader, Loader};
	use crate::upstream::MemoryStore;
	use tokio::time::timeout;

	fn single_value_stat(store: Arc<MemoryStore>, prefix: &str) -> Arc<Stat> {
		let loader = Loader::SingleValue(LeafLoader::new(StatKey::new(prefix), store));
		Stat::new("votes".to_owned(), 0, loader)
	}

	#[tokio::test(start_paused = true)]
	async fn a_burst_of_updates_collapses_into_one_refresh_after_min_delay() {
		let store = Arc::new(MemoryStore::new());
		store.set_int("p:data", 1);
		let stat = single_value_stat(store.clone(), "p");
		stat.load().await.unwrap();

		let (tx, rx) = broadcast::channel(16);
		let (err_tx, mut err_rx) = mpsc::unbounded_channel();
		let mut notified = stat.register_listener();
		let handle = tokio::spawn(run(Arc::clone(&stat), rx, Duration::from_millis(50), Duration::from_secs(5), err_tx));

		store.set_int("p:data", 2);
		tx.send(()).unwrap();
		tokio::time::advance(Duration::from_millis(10)).await;
		tx.send(()).unwrap();
		tokio::time::advance(Duration::from_millis(10)).await;
		tx.send(()).unwrap();

		tokio::time::advance(Duration::from_millis(60)).await;
		timeout(Duration::from_secs(1), notified.recv()).await.unwrap().unwrap();

		assert!(err_rx.try_recv().is_err());
		handle.abort();
	}

	#[tokio::test(start_paused = true)]
	async fn sustained_updates_refresh_at_max_delay() {
		let store = Arc::new(MemoryStore::new());
		store.set_int("p:data", 1);
		let stat = single_value_stat(store, "p");
		stat.load().await.unwrap();

		let (tx, rx) = broadcast::channel(16);
		let (err_tx, _err_rx) = mpsc::unbounded_channel();
		let mut notified = stat.register_listener();
		let handle = tokio::spawn(run(Arc::clone(&stat), rx, Duration::from_millis(50), Duration::from_millis(120), err_tx));

		for _ in 0..10 {
			tx.send(()).unwrap();
			tokio::time::advance(Duration::from_millis(30)).await;
		}

		timeout(Duration::from_secs(1), notified.recv()).await.unwrap().unwrap();
		handle.abort();
	}
}
