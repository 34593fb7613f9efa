//! A current/total pair, and the proportion and percentage derived from it.

use serde::{Serialize, Serializer};
use serde::ser::SerializeStruct;

use crate::errors::RefreshError;
use crate::loader::LeafLoader;

/// `current`/`total` plus the `proportion`/`percentage` they imply.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProportionData {
	pub(crate) current: i64,
	pub(crate) total: i64,
}

impl ProportionData {
	pub(crate) async fn load(loader: &LeafLoader) -> Result<Self, crate::errors::LoaderError> {
		let fields = loader.fetch_map_fields("data", &["current", "total"]).await?;
		let (current, total) = current_total(&fields);
		Ok(Self { current, total })
	}

	pub(crate) async fn refresh(&mut self, loader: &LeafLoader) -> Result<(), RefreshError> {
		let fields = loader.fetch_map_fields("data", &["current", "total"]).await?;
		(self.current, self.total) = current_total(&fields);
		Ok(())
	}

	/// `current / total`, or `0.0` if `total` is zero.
	#[must_use]
	pub fn proportion(&self) -> f64 {
		if self.total == 0 {
			return 0.0;
		}
		#[allow(clippy::cast_precision_loss, reason = "stat values are small vote-scale counters")]
		{
			self.current as f64 / self.total as f64
		}
	}

	/// `proportion() * 100`.
	#[must_use]
	pub fn percentage(&self) -> f64 {
		self.proportion() * 100.0
	}

	/// The value of `field` (`current`, `proportion`, or `percentage`), or
	/// `0.0` for anything else.
	#[must_use]
	pub fn milestone_value(&self, field: &str) -> f64 {
		match field {
			#[allow(clippy::cast_precision_loss, reason = "stat values are small vote-scale counters")]
			"current" => self.current as f64,
			"proportion" => self.proportion(),
			"percentage" => self.percentage(),
			_ => 0.0,
		}
	}
}

/// Pulls the `(current, total)` pair out of a two-element fetch result,
/// defaulting missing entries to zero rather than indexing directly.
pub(crate) fn current_total(fields: &[i64]) -> (i64, i64) {
	(fields.first().copied().unwrap_or(0), fields.get(1).copied().unwrap_or(0))
}

impl Serialize for ProportionData {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut state = serializer.serialize_struct("ProportionData", 4)?;
		state.serialize_field("current", &self.current)?;
		state.serialize_field("total", &self.total)?;
		state.serialize_field("proportion", &self.proportion())?;
		state.serialize_field("percentage", &self.percentage())?;
		state.end()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn proportion_and_percentage_guard_against_zero_total() {
		let data = ProportionData { current: 5, total: 0 };
		assert_eq!(data.proportion(), 0.0);
		assert_eq!(data.percentage(), 0.0);
	}

	#[test]
	fn proportion_and_percentage_compute_from_current_and_total() {
		let data = ProportionData { current: 1, total: 4 };
		assert_eq!(data.proportion(), 0.25);
		assert_eq!(data.percentage(), 25.0);
	}

	#[test]
	fn milestone_value_dispatches_on_field_name() {
		let data = ProportionData { current: 3, total: 12 };
		assert_eq!(data.milestone_value("current"), 3.0);
		assert_eq!(data.milestone_value("proportion"), 0.25);
		assert_eq!(data.milestone_value("percentage"), 25.0);
		assert_eq!(data.milestone_value("unknown"), 0.0);
	}

	#[test]
	fn serialises_all_four_fields() {
		let data = ProportionData { current: 1, total: 2 };
		let json = serde_json::to_value(data).unwrap();
		assert_eq!(json["current"], 1);
		assert_eq!(json["total"], 2);
		assert_eq!(json["proportion"], 0.5);
		assert_eq!(json["percentage"], 50.0);
	}
}
