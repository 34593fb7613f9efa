//! Arithmospora lister: loads a source once and prints a snapshot of every
//! stat it contains, as indented text or as JSON.

#![allow(clippy::expect_used, reason = "Acceptable in a binary crate")]
#![allow(clippy::print_stdout, reason = "This binary's entire purpose is printing to stdout")]
#![allow(clippy::unwrap_used, reason = "Acceptable in a binary crate")]

use std::sync::Arc;

use arithmospora::config::Config;
use arithmospora::source::Source;
use arithmospora::stat::StatSnapshot;
use arithmospora::upstream::{MemoryStore, SharedStore};
use clap::{Parser, ValueEnum};
use indexmap::IndexMap;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
	Text,
	Json,
}

/// Prints a snapshot of every stat in one source.
#[derive(Debug, Parser)]
struct Args {
	/// Path to the TOML configuration file.
	#[arg(short, long, default_value = "Config.toml")]
	config: std::path::PathBuf,
	/// Name of the source to list. Defaults to the first source in the
	/// configuration file.
	#[arg(long)]
	source: Option<String>,
	/// Output format.
	#[arg(short = 'f', long, default_value = "text")]
	format: Format,
	/// Pretty-print JSON output (ignored for text output).
	#[arg(long)]
	pp: bool,
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

	let mut json_output: IndexMap<String, IndexMap<String, StatSnapshot>> = IndexMap::new();

	for (group, stats) in &source.stats {
		if matches!(args.format, Format::Text) {
			println!("Stat group: {group}");
		}
		for stat in stats.values() {
			stat.reload().await.expect("failed to load stat");
			let snapshot = stat.snapshot().await;
			match args.format {
				Format::Text => println!("{}", render_text(&snapshot, 0)),
				Format::Json => {
					let _ = json_output.entry(format!("{group}Stats")).or_default().insert(snapshot.name.clone(), snapshot);
				}
			}
		}
	}

	if matches!(args.format, Format::Json) {
		let encoded = if args.pp {
			serde_json::to_string_pretty(&json_output).expect("failed to encode JSON")
		} else {
			serde_json::to_string(&json_output).expect("failed to encode JSON")
		};
		println!("{encoded}");
	}
}

fn render_text(snapshot: &StatSnapshot, depth: usize) -> String {
	let names: Vec<&str> = snapshot.data_points.keys().map(String::as_str).collect();
	let mut out = format!("{} {} {:?}", snapshot.name, snapshot.data, names);
	for child in snapshot.data_points.values() {
		out.push('\n');
		out.push_str(&" ".repeat(depth.saturating_add(1).saturating_mul(2)));
		out.push_str(&render_text(child, depth.saturating_add(1)));
	}
	out
}
