//! A single scalar counter, e.g. a running vote total.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::errors::RefreshError;
use crate::loader::LeafLoader;

/// `{ "<name>": <int> }` — the name is the stat's own name, not a fixed key,
/// so this carries it explicitly rather than deriving `Serialize`.
#[derive(Clone, Debug, Default)]
pub struct SingleValueData {
	name: String,
	data: i64,
}

impl SingleValueData {
	pub(crate) async fn load(stat_name: &str, loader: &LeafLoader) -> Result<Self, crate::errors::LoaderError> {
		let data = loader.fetch_int("data").await?;
		Ok(Self { name: stat_name.to_owned(), data })
	}

	pub(crate) async fn refresh(&mut self, loader: &LeafLoader) -> Result<(), RefreshError> {
		self.data = loader.fetch_int("data").await?;
		Ok(())
	}

	/// Always `0.0`: a bare scalar carries no named field for a milestone
	/// rule to target.
	#[must_use]
	pub fn milestone_value(&self, _field: &str) -> f64 {
		0.0
	}
}

impl Serialize for SingleValueData {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(1))?;
		map.serialize_entry(&self.name, &self.data)?;
		map.end()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::StatKey;
	use crate::upstream::MemoryStore;
	use std::sync::Arc;

	#[tokio::test]
	async fn loads_and_serialises_under_its_own_name() {
		let store = Arc::new(MemoryStore::new());
		store.set_int("p:stats:votes:data", 7);
		let loader = LeafLoader::new(StatKey::new("p:stats:votes"), store);
		let data = SingleValueData::load("votes", &loader).await.unwrap();
		let json = serde_json::to_string(&data).unwrap();
		assert_eq!(json, r#"{"votes":7}"#);
	}

	#[tokio::test]
	async fn refresh_rereads_the_upstream_value() {
		let store = Arc::new(MemoryStore::new());
		store.set_int("p:stats:votes:data", 7);
		let loader = LeafLoader::new(StatKey::new("p:stats:votes"), store.clone());
		let mut data = SingleValueData::load("votes", &loader).await.unwrap();
		store.set_int("p:stats:votes:data", 99);
		data.refresh(&loader).await.unwrap();
		assert_eq!(data.milestone_value("votes"), 0.0);
		assert_eq!(serde_json::to_string(&data).unwrap(), r#"{"votes":99}"#);
	}
}
