//! Arithmospora watcher: streams live updates for one or all stats in a
//! source to stdout as they arrive.

#![allow(clippy::expect_used, reason = "Acceptable in a binary crate")]
#![allow(clippy::print_stdout, reason = "This binary's entire purpose is printing to stdout")]
#![allow(clippy::print_stderr, reason = "Used for a single fatal usage message")]
#![allow(clippy::unwrap_used, reason = "Acceptable in a binary crate")]

use std::sync::Arc;

use arithmospora::config::Config;
use arithmospora::source::Source;
use arithmospora::upstream::{MemoryStore, SharedStore};
use clap::Parser;
use tokio::sync::mpsc;

/// Streams updates for selected stats in one source.
#[derive(Debug, Parser)]
struct Args {
	/// Path to the TOML configuration file.
	#[arg(short, long, default_value = "Config.toml")]
	config: std::path::PathBuf,
	/// Name of the source to watch. Defaults to the first source in the
	/// configuration file.
	#[arg(long)]
	source: Option<String>,
	/// Name of the stat to watch, or "all" to watch every stat in the source.
	#[arg(long, default_value = "all")]
	stat: String,
}

#[tokio::main]
async fn main() {
	let args = Args::parse();
	let config = Config::load(&args.config).expect("failed to load configuration");
	let store: SharedStore = Arc::new(MemoryStore::new());

	let source_config = match &args.source {
		Some(name) => config.sources.iter().find(|source| &source.name == name).expect("no such source"),
		None => config.sources.first().expect("configuration has no sources"),
	};
	let source = Source::from_config(&store, source_config);

	let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
	let mut watching = 0_usize;

	for stats in source.stats.values() {
		for stat in stats.values() {
			if args.stat != "all" && args.stat != stat.name {
				continue;
			}
			watching += 1;
			stat.listen_for_updates(config.debounce.min(), config.debounce.max(), errors_tx.clone())
				.await
				.expect("failed to start listening for updates");

			let mut updates = stat.register_listener();
			let watched = Arc::clone(stat);
			let _handle = tokio::spawn(async move {
				while updates.recv().await.is_ok() {
					let snapshot = watched.snapshot().await;
					println!("{}", serde_json::to_string(&snapshot).unwrap_or_default());
				}
			});
		}
	}

	if watching == 0 {
		eprintln!("no matching stats in source \"{}\"", source_config.name);
		return;
	}

	while let Some(err) = errors_rx.recv().await {
		println!("{err}");
	}
}
