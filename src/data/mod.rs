//! The five shapes a stat's data can take.

pub mod generic;
pub mod proportion;
pub mod rolling;
pub mod single_value;
pub mod timed;

use serde::Serialize;

pub use generic::GenericData;
pub use proportion::ProportionData;
pub use rolling::RollingData;
pub use single_value::SingleValueData;
pub use timed::TimedData;

use crate::errors::RefreshError;
use crate::loader::Loader;

/// A stat's current value, in whichever of the five shapes its data type
/// chose. Serialises untagged: each variant's own `Serialize` impl produces
/// its wire shape directly, with no enum tag wrapping it.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum StatData {
	/// A single scalar counter.
	SingleValue(SingleValueData),
	/// A named-field map of counters.
	Generic(GenericData),
	/// A current/total pair and its derived ratios.
	Proportion(ProportionData),
	/// A [`ProportionData`] plus a peak value.
	Rolling(RollingData),
	/// Bucketed time-series data.
	Timed(TimedData),
}

impl StatData {
	/// Re-fetches this variant's value from the upstream store, dispatching
	/// to the matching loader variant.
	pub(crate) async fn refresh(&mut self, loader: &Loader) -> Result<(), RefreshError> {
		match (self, loader) {
			(Self::SingleValue(data), Loader::SingleValue(leaf)) => data.refresh(leaf).await,
			(Self::Generic(data), Loader::Generic(leaf)) => data.refresh(leaf).await,
			(Self::Proportion(data), Loader::Proportion(leaf)) => data.refresh(leaf).await,
			(Self::Rolling(data), Loader::Rolling(leaf)) => data.refresh(leaf).await,
			(Self::Timed(data), Loader::Timed(timed)) => data.refresh(timed).await,
			_ => Err(RefreshError::VariantMismatch),
		}
	}

	/// The named numeric field a milestone rule may target. Unsupported
	/// fields (or variants that don't expose one) resolve to `0.0`.
	#[must_use]
	pub fn milestone_value(&self, field: &str) -> f64 {
		match self {
			Self::SingleValue(data) => data.milestone_value(field),
			Self::Generic(data) => data.milestone_value(field),
			Self::Proportion(data) => data.milestone_value(field),
			Self::Rolling(data) => data.milestone_value(field),
			Self::Timed(data) => data.milestone_value(field),
		}
	}

	/// Renders this value as a `serde_json::Value`, for embedding in a
	/// [`crate::stat::StatSnapshot`].
	#[must_use]
	pub fn to_json(&self) -> serde_json::Value {
		serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
	}
}
