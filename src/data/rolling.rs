//! A [`ProportionData`] plus a peak value and the peak proportion/percentage
//! it implies — used for rolling windows where the current value can dip
//! back down after a high point.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::proportion::{current_total, ProportionData};
use crate::errors::RefreshError;
use crate::loader::LeafLoader;

/// `current`/`total`/`peak` plus the four derived ratios.
#[derive(Clone, Copy, Debug, Default)]
pub struct RollingData {
	proportion: ProportionData,
	peak: i64,
}

impl RollingData {
	pub(crate) async fn load(loader: &LeafLoader) -> Result<Self, crate::errors::LoaderError> {
		let fields = loader.fetch_map_fields("data", &["current", "total", "peak"]).await?;
		let (current, total) = current_total(&fields);
		let peak = fields.get(2).copied().unwrap_or(0);
		Ok(Self { proportion: ProportionData { current, total }, peak })
	}

	pub(crate) async fn refresh(&mut self, loader: &LeafLoader) -> Result<(), RefreshError> {
		let fields = loader.fetch_map_fields("data", &["current", "total", "peak"]).await?;
		let (current, total) = current_total(&fields);
		self.proportion = ProportionData { current, total };
		self.peak = fields.get(2).copied().unwrap_or(0);
		Ok(())
	}

	/// `peak / total`, or `0.0` if `total` is zero.
	#[must_use]
	pub fn peak_proportion(&self) -> f64 {
		if self.proportion.total == 0 {
			return 0.0;
		}
		#[allow(clippy::cast_precision_loss, reason = "stat values are small vote-scale counters")]
		{
			self.peak as f64 / self.proportion.total as f64
		}
	}

	/// `peak_proportion() * 100`.
	#[must_use]
	pub fn peak_percentage(&self) -> f64 {
		self.peak_proportion() * 100.0
	}

	/// Delegates `current`/`proportion`/`percentage` to the embedded
	/// [`ProportionData`]; `peak`, `peakProportion`, `peakPercentage` are
	/// not reachable by milestone rules, mirroring the original's field set.
	#[must_use]
	pub fn milestone_value(&self, field: &str) -> f64 {
		self.proportion.milestone_value(field)
	}
}

impl Serialize for RollingData {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut state = serializer.serialize_struct("RollingData", 7)?;
		state.serialize_field("current", &self.proportion.current)?;
		state.serialize_field("total", &self.proportion.total)?;
		state.serialize_field("peak", &self.peak)?;
		state.serialize_field("proportion", &self.proportion.proportion())?;
		state.serialize_field("percentage", &self.proportion.percentage())?;
		state.serialize_field("peakProportion", &self.peak_proportion())?;
		state.serialize_field("peakPercentage", &self.peak_percentage())?;
		state.end()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn peak_ratios_guard_against_zero_total() {
		let data = RollingData { proportion: ProportionData { current: 0, total: 0 }, peak: 5 };
		assert_eq!(data.peak_proportion(), 0.0);
		assert_eq!(data.peak_percentage(), 0.0);
	}

	#[test]
	fn peak_ratios_compute_from_peak_and_total() {
		let data = RollingData { proportion: ProportionData { current: 2, total: 10 }, peak: 6 };
		assert_eq!(data.peak_proportion(), 0.6);
		assert_eq!(data.peak_percentage(), 60.0);
	}

	#[test]
	fn serialises_all_seven_fields() {
		let data = RollingData { proportion: ProportionData { current: 2, total: 10 }, peak: 6 };
		let json = serde_json::to_value(data).unwrap();
		assert_eq!(json["current"], 2);
		assert_eq!(json["total"], 10);
		assert_eq!(json["peak"], 6);
		assert_eq!(json["proportion"], 0.2);
		assert_eq!(json["percentage"], 20.0);
		assert_eq!(json["peakProportion"], 0.6);
		assert_eq!(json["peakPercentage"], 60.0);
	}
}
