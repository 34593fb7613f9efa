//! Configuration tree: an idiomatic re-expression of the original's
//! `tomlConfig` family, loaded with `figment` the way
//! `terracotta::config::Config` is.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::errors::ConfigError;
use crate::milestone::Comparator;

/// The root configuration tree for the server and CLIs.
#[derive(Clone, Debug, Default, Deserialize, Serialize, SmartDefault)]
pub struct Config {
	/// Upstream store connection options.
	#[serde(default)]
	pub upstream: UpstreamConfig,
	/// HTTP/TLS listen options.
	#[serde(default)]
	pub transport: TransportConfig,
	/// WebSocket liveness tuning.
	#[serde(default)]
	pub socket: SocketConfig,
	/// Debounce timing shared by every live stat.
	#[serde(default)]
	pub debounce: DebounceConfig,
	/// The sources this deployment serves.
	#[serde(default)]
	pub sources: Vec<SourceConfig>,
}

impl Config {
	/// Loads configuration from `path` (TOML), then layers environment
	/// variables prefixed `ARITHMOSPORA_` on top, mirroring
	/// `terracotta::app::init::load_config`.
	pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
		let config = Figment::new()
			.merge(Toml::file(path))
			.merge(Env::prefixed("ARITHMOSPORA_").split("__"))
			.extract()?;
		Ok(config)
	}
}

/// Upstream store connection options.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
pub struct UpstreamConfig {
	/// The upstream store's address.
	#[default = "127.0.0.1:6379"]
	pub server: String,
	/// The logical database/namespace to select after connecting.
	pub db: i64,
	/// Maximum idle connections to keep in the pool.
	#[default = 3]
	pub max_idle: u32,
	/// Seconds an idle connection may sit before being recycled.
	#[default = 240]
	pub idle_timeout_secs: u64,
}

/// HTTP/TLS listen options.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
pub struct TransportConfig {
	/// The address to bind the WebSocket server to.
	#[default = "127.0.0.1:8000"]
	pub address: String,
	/// TLS certificate path, if serving over TLS.
	pub cert_path: Option<PathBuf>,
	/// TLS private key path, if serving over TLS.
	pub key_path: Option<PathBuf>,
}

impl TransportConfig {
	/// Whether both halves of a TLS identity are configured.
	#[must_use]
	pub fn tls_enabled(&self) -> bool {
		self.cert_path.is_some() && self.key_path.is_some()
	}
}

/// WebSocket liveness tuning, mirroring the original's `WebsocketConfig`.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, SmartDefault)]
pub struct SocketConfig {
	/// Seconds allowed for a single write to complete.
	#[default = 10]
	pub write_wait_secs: u64,
	/// Seconds without a pong before a client is considered dead.
	#[default = 60]
	pub pong_wait_secs: u64,
	/// Seconds between keepalive pings.
	#[default = 54]
	pub ping_period_secs: u64,
}

impl SocketConfig {
	/// [`Self::write_wait_secs`] as a [`Duration`].
	#[must_use]
	pub fn write_wait(&self) -> Duration {
		Duration::from_secs(self.write_wait_secs)
	}

	/// [`Self::pong_wait_secs`] as a [`Duration`].
	#[must_use]
	pub fn pong_wait(&self) -> Duration {
		Duration::from_secs(self.pong_wait_secs)
	}

	/// [`Self::ping_period_secs`] as a [`Duration`].
	#[must_use]
	pub fn ping_period(&self) -> Duration {
		Duration::from_secs(self.ping_period_secs)
	}
}

/// Debounce timing for live stats, mirroring the original's
/// `DebounceConfig`.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, SmartDefault)]
pub struct DebounceConfig {
	/// Milliseconds of quiet before a burst of updates collapses into a
	/// refresh.
	#[default = 50]
	pub min_time_ms: u64,
	/// Maximum milliseconds a sustained burst may delay a refresh.
	#[default = 500]
	pub max_time_ms: u64,
}

impl DebounceConfig {
	/// [`Self::min_time_ms`] as a [`Duration`].
	#[must_use]
	pub fn min(&self) -> Duration {
		Duration::from_millis(self.min_time_ms)
	}

	/// [`Self::max_time_ms`] as a [`Duration`].
	#[must_use]
	pub fn max(&self) -> Duration {
		Duration::from_millis(self.max_time_ms)
	}
}

/// One granularity of a timed stat: its bucket width in seconds and how
/// many cycles of history to keep (negative meaning the whole period).
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct PeriodConfig {
	/// Bucket width, in seconds.
	pub granularity: i64,
	/// Cycles of moving-window history to retain, or a negative number for
	/// a whole-period histogram.
	pub cycles: i64,
}

/// A single source: a stat tree plus its milestone collections.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SourceConfig {
	/// The source's name, used to key it among its siblings and to select
	/// it on the CLI.
	pub name: String,
	/// The upstream key prefix this source's stats live under.
	pub prefix: String,
	/// The start of the period this source covers (used by timed stats).
	pub start_time: DateTime<Utc>,
	/// The end of the period this source covers (used by timed stats).
	pub end_time: DateTime<Utc>,
	/// Whether this source should listen for live updates, as opposed to a
	/// one-shot load (for a source describing a concluded event).
	#[serde(default)]
	pub is_live: bool,
	/// Granularities available to this source's timed stats.
	#[serde(default)]
	pub timed_periods: Vec<PeriodConfig>,
	/// The stats this source exposes, grouped by data shape.
	#[serde(default)]
	pub stats: StatGroupConfig,
	/// The milestone collections watching this source's stats.
	#[serde(default)]
	pub milestones: Vec<MilestoneGroupConfig>,
}

/// Stats grouped by the data shape they'll be loaded as.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct StatGroupConfig {
	/// Proportion stats (`current`/`total`).
	#[serde(default)]
	pub proportion: Vec<StatConfig>,
	/// Rolling stats (proportion plus a peak).
	#[serde(default)]
	pub rolling: Vec<StatConfig>,
	/// Timed stats (bucketed time series).
	#[serde(default)]
	pub timed: Vec<StatConfig>,
	/// Everything else: single-value or generic stats.
	#[serde(default)]
	pub other: Vec<StatConfig>,
}

/// One stat's configuration within a group.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StatConfig {
	/// The stat's name.
	pub name: String,
	/// For rolling/other stats keyed additionally by period (e.g. "today").
	#[serde(default)]
	pub period: Option<String>,
	/// The data variant to load, defaulting to the owning group's implied
	/// shape (`single_value` for "other" stats without an explicit type).
	#[serde(default)]
	pub data_type: Option<String>,
}

/// A collection of milestone rules anchored on one stat.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MilestoneGroupConfig {
	/// The collection's name.
	pub name: String,
	/// The stat group (`proportion`, `rolling`, `timed`, or `other`) the
	/// anchor stat lives in.
	pub group: String,
	/// The anchor stat's key within that group.
	pub stat: String,
	/// The milestone rules in this collection.
	pub milestones: Vec<MilestoneConfig>,
}

/// One milestone rule.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MilestoneConfig {
	/// The milestone's name.
	pub name: String,
	/// The path of data-point names to walk from the anchor stat to the
	/// stat the rule evaluates.
	#[serde(default)]
	pub data_point_path: Vec<String>,
	/// The named field on the target stat's data to compare.
	pub field: String,
	/// The threshold to compare against.
	pub target: f64,
	/// How `field`'s value compares to `target`.
	pub comparator: Comparator,
	/// The message to surface once this milestone fires.
	pub message: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_the_original_deployment_defaults() {
		let config = Config::default();
		assert_eq!(config.upstream.server, "127.0.0.1:6379");
		assert_eq!(config.upstream.max_idle, 3);
		assert_eq!(config.transport.address, "127.0.0.1:8000");
		assert_eq!(config.socket.pong_wait_secs, 60);
		assert_eq!(config.debounce.min_time_ms, 50);
		assert_eq!(config.debounce.max_time_ms, 500);
	}

	#[test]
	fn tls_enabled_requires_both_cert_and_key() {
		let mut transport = TransportConfig::default();
		assert!(!transport.tls_enabled());
		transport.cert_path = Some(PathBuf::from("cert.pem"));
		assert!(!transport.tls_enabled());
		transport.key_path = Some(PathBuf::from("key.pem"));
		assert!(transport.tls_enabled());
	}
}
