//! Arithmospora
//!
//! A reactive statistic tree and WebSocket fan-out layer: it loads
//! hierarchical statistic trees from an upstream key-value/pub-sub store,
//! debounces their update notifications into stable snapshots, evaluates
//! milestone threshold rules, and broadcasts JSON messages to connected
//! clients.

//	Lints specifically disabled for unit tests
#![cfg_attr(
	test,
	allow(
		clippy::arithmetic_side_effects,
		clippy::cognitive_complexity,
		clippy::default_numeric_fallback,
		clippy::expect_used,
		clippy::indexing_slicing,
		clippy::missing_panics_doc,
		clippy::too_many_lines,
		clippy::unwrap_in_result,
		clippy::unwrap_used,
		reason = "Not useful in unit tests"
	)
)]

pub mod client;
pub mod config;
pub mod data;
pub mod debounce;
pub mod errors;
pub mod hub;
pub mod key;
pub mod loader;
pub mod logging;
pub mod message;
pub mod milestone;
pub mod source;
pub mod stat;
#[cfg(test)]
mod tests;
pub mod upstream;
