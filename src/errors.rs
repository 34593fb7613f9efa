//! Error kinds for every fallible boundary in the crate.
//!
//! Grounded on `terracotta::errors::errors::ErrorsError`: one `thiserror`
//! enum per concern, all `#[non_exhaustive]` so new variants don't break
//! downstream matches.

use thiserror::Error as ThisError;

/// Failures loading or parsing the configuration tree.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum ConfigError {
	/// The configuration file could not be read.
	#[error("could not read configuration file: {0}")]
	Io(#[from] std::io::Error),

	/// The configuration could not be parsed or extracted.
	#[error("could not parse configuration: {0}")]
	Parse(#[from] figment::Error),
}

/// Failures talking to the upstream store.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum UpstreamError {
	/// A connection to the upstream store could not be acquired.
	#[error("connection to the upstream store could not be acquired: {0}")]
	Connection(String),

	/// A key held a value that didn't match the shape the caller expected.
	#[error("key \"{0}\" held a value of an unexpected shape")]
	UnexpectedShape(String),
}

/// Failures during a stat's initial load (and the recursive load of its
/// data points).
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum LoaderError {
	/// The underlying upstream read failed.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
}

/// Failures during a stat's periodic refresh.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum RefreshError {
	/// The underlying upstream read failed.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),

	/// A data variant was asked to refresh with a loader of another variant.
	/// This should be unreachable given how `Stat` constructs its data, but
	/// is represented rather than panicked on.
	#[error("data variant and loader were of mismatched kinds")]
	VariantMismatch,
}

/// Failures encoding an outbound broadcast message.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum EncodeError {
	/// `serde_json` failed to serialise the message.
	#[error("failed to encode message as JSON: {0}")]
	Json(#[from] serde_json::Error),
}

/// Failures writing to or reading from a client's WebSocket connection.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum TransportError {
	/// The underlying WebSocket connection reported an error.
	#[error("WebSocket error: {0}")]
	WebSocket(#[from] axum::Error),

	/// A write did not complete before the configured deadline.
	#[error("write to client did not complete before the write deadline")]
	WriteTimeout,
}

/// Failures in the upstream pub/sub subscription used to drive reactive
/// updates.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum SubscriptionError {
	/// The subscription to an update channel was lost.
	#[error("lost subscription to update channel \"{channel}\": {source}")]
	Lost {
		/// The channel the subscription was for.
		channel: String,
		/// The underlying cause.
		#[source]
		source: UpstreamError,
	},
}
