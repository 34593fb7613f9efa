//! Logging setup and the periodic stats-logger task.

use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling::daily};
use tracing_subscriber::fmt::writer::MakeWriterExt as _;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{registry, EnvFilter};

use crate::source::Source;

/// How often the stats-logger task reports each source's counters.
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Sets up logging to the terminal and to a daily-rotating file under
/// `logdir`. The returned guard must be held for the process lifetime, or
/// the non-blocking file writer stops flushing.
pub fn setup_logging(logdir: &str) -> WorkerGuard {
	let (non_blocking_appender, guard) = non_blocking(daily(logdir, "general.log"));
	registry()
		.with(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| format!("info,{}=debug,tower_http=debug", env!("CARGO_PKG_NAME")).into()),
		)
		.with(tracing_subscriber::fmt::layer().with_writer(stdout.with_max_level(Level::DEBUG)))
		.with(tracing_subscriber::fmt::layer().with_writer(non_blocking_appender.with_max_level(Level::INFO)))
		.init();
	guard
}

/// Spawns a task that logs each source's popped update/milestone counters
/// and current client count every [`STATS_LOG_INTERVAL`].
pub fn spawn_stats_logger(sources: Vec<Arc<Source>>) {
	let _handle = tokio::spawn(async move {
		let mut interval = tokio::time::interval(STATS_LOG_INTERVAL);
		loop {
			let _ = interval.tick().await;
			for source in &sources {
				info!(
					source = %source.name,
					updates = source.pop_updates_count(),
					milestones = source.pop_milestones_count(),
					clients = source.client_count(),
					"source stats",
				);
			}
		}
	});
}
