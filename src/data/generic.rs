//! A named-field map of counters, e.g. votes per candidate.

use std::collections::HashMap;

use serde::Serialize;

use crate::errors::RefreshError;
use crate::loader::LeafLoader;

/// Serialises transparently as the underlying map: `{"<field>": <int>, ...}`.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct GenericData {
	data: HashMap<String, i64>,
}

impl GenericData {
	pub(crate) async fn load(loader: &LeafLoader) -> Result<Self, crate::errors::LoaderError> {
		let data = loader.fetch_map("data").await?;
		Ok(Self { data })
	}

	pub(crate) async fn refresh(&mut self, loader: &LeafLoader) -> Result<(), RefreshError> {
		self.data = loader.fetch_map("data").await?;
		Ok(())
	}

	/// The value of `field`, or `0.0` if it isn't present.
	#[must_use]
	pub fn milestone_value(&self, field: &str) -> f64 {
		#[allow(clippy::cast_precision_loss, reason = "stat values are small vote-scale counters")]
		{
			self.data.get(field).copied().unwrap_or(0) as f64
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::StatKey;
	use crate::upstream::MemoryStore;
	use std::sync::Arc;

	#[tokio::test]
	async fn loads_map_and_reads_milestone_fields() {
		let store = Arc::new(MemoryStore::new());
		let mut seed = HashMap::new();
		let _ = seed.insert("yes".to_owned(), 12);
		let _ = seed.insert("no".to_owned(), 3);
		store.set_map("p:stats:ballot:data", seed);
		let loader = LeafLoader::new(StatKey::new("p:stats:ballot"), store);
		let data = GenericData::load(&loader).await.unwrap();
		assert_eq!(data.milestone_value("yes"), 12.0);
		assert_eq!(data.milestone_value("missing"), 0.0);
	}
}
