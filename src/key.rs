//! Colon-joined key construction for the upstream store.
//!
//! Mirrors `RedisKeyMaker`/`makeKey` from the original implementation, but as
//! an immutable builder rather than a mutable "set prefix" struct, so that
//! deriving a child key never risks mutating a shared ancestor.

/// Joins key elements with `:`, the wire format the upstream store expects.
fn join(elements: &[&str]) -> String {
	elements.join(":")
}

/// An immutable, prefixed key builder.
///
/// `StatKey::new("election:2024").make(&["stats", "turnout", "data"])`
/// produces `election:2024:stats:turnout:data`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StatKey {
	prefix: String,
}

impl StatKey {
	/// Builds a key rooted at `prefix`.
	#[must_use]
	pub fn new(prefix: impl Into<String>) -> Self {
		Self { prefix: prefix.into() }
	}

	/// Joins `suffixes` onto this key's prefix.
	#[must_use]
	pub fn make(&self, suffixes: &[&str]) -> String {
		if suffixes.is_empty() {
			return self.prefix.clone();
		}
		let mut elements = Vec::with_capacity(suffixes.len() + 1);
		elements.push(self.prefix.as_str());
		elements.extend_from_slice(suffixes);
		join(&elements)
	}

	/// Derives a key one level deeper, under `datapoints:<name>`.
	#[must_use]
	pub fn child(&self, name: &str) -> Self {
		Self { prefix: self.make(&["datapoints", name]) }
	}

	/// The raw prefix string, mostly useful for logging.
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.prefix
	}
}
