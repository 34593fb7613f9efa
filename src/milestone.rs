//! Threshold rules evaluated against a stat each time it updates, firing a
//! message at most once when a named field crosses a target.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::{broadcast, mpsc};

use crate::stat::Stat;

/// How a milestone's field value compares to its target.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Comparator {
	/// Strictly greater than.
	#[serde(rename = ">")]
	Gt,
	/// Greater than or equal to.
	#[serde(rename = ">=")]
	Ge,
	/// Equal to.
	#[serde(rename = "=")]
	Eq,
	/// Less than or equal to.
	#[serde(rename = "<=")]
	Le,
	/// Strictly less than.
	#[serde(rename = "<")]
	Lt,
}

impl Comparator {
	/// Whether `value` satisfies this comparison against `target`.
	#[must_use]
	pub fn matches(self, value: f64, target: f64) -> bool {
		match self {
			Self::Gt => value > target,
			Self::Ge => value >= target,
			#[allow(clippy::float_cmp, reason = "milestone targets are author-specified exact thresholds")]
			Self::Eq => value == target,
			Self::Le => value <= target,
			Self::Lt => value < target,
		}
	}
}

#[derive(Debug, Default)]
struct MilestoneState {
	achieved: bool,
	achieved_when: Option<DateTime<Utc>>,
}

/// A single threshold rule: "when the named field of the stat reached by
/// walking `data_point_path` from the anchor satisfies `comparator` against
/// `target`, fire once."
#[derive(Debug, Serialize)]
pub struct Milestone {
	/// The milestone's name.
	pub name: String,
	/// The path of data-point names to walk from the anchor stat.
	#[serde(rename = "dataPointNames")]
	pub data_point_path: Vec<String>,
	/// The named field on the target stat's data to compare.
	pub field: String,
	/// The threshold to compare against.
	pub target: f64,
	/// How `field`'s value compares to `target`.
	pub comparator: Comparator,
	/// The message to surface once this milestone fires.
	pub message: String,
	#[serde(rename = "achievedWhen", serialize_with = "serialize_achieved_when")]
	state: Mutex<MilestoneState>,
}

fn serialize_achieved_when<S: Serializer>(state: &Mutex<MilestoneState>, serializer: S) -> Result<S::Ok, S::Error> {
	state.lock().achieved_when.serialize(serializer)
}

impl Milestone {
	/// Builds an unachieved milestone.
	#[must_use]
	pub fn new(
		name: String,
		data_point_path: Vec<String>,
		field: String,
		target: f64,
		comparator: Comparator,
		message: String,
	) -> Self {
		Self { name, data_point_path, field, target, comparator, message, state: Mutex::new(MilestoneState::default()) }
	}

	/// Walks `data_point_path` from `anchor`, compares the resulting stat's
	/// `field` against `target`, and if newly satisfied, marks this
	/// milestone achieved and returns `true`. Evaluating an already-achieved
	/// milestone is a cheap no-op that always returns `false`.
	pub async fn evaluate(&self, anchor: &Arc<Stat>) -> bool {
		if self.state.lock().achieved {
			return false;
		}

		let mut target_stat = Arc::clone(anchor);
		for name in &self.data_point_path {
			let Some(child) = target_stat.child(name).await else {
				return false;
			};
			target_stat = child;
		}

		let Some(value) = target_stat.milestone_value(&self.field).await else {
			return false;
		};
		if !self.comparator.matches(value, self.target) {
			return false;
		}

		let mut state = self.state.lock();
		if state.achieved {
			return false;
		}
		state.achieved = true;
		state.achieved_when = Some(Utc::now());
		true
	}
}

/// A group of milestones anchored on one stat, evaluated once at startup
/// (silently, to catch milestones already met) and then on every subsequent
/// update of the anchor.
pub struct MilestoneCollection {
	/// The collection's name.
	pub name: String,
	/// The stat this collection's milestones are evaluated against.
	pub anchor: Arc<Stat>,
	/// The milestone rules in this collection.
	pub milestones: Vec<Arc<Milestone>>,
}

impl MilestoneCollection {
	/// Evaluates every milestone once (without publishing), then spawns a
	/// task that re-evaluates on every anchor update and sends newly-fired
	/// milestones to `achieved`.
	pub async fn publish(self: Arc<Self>, achieved: mpsc::UnboundedSender<Arc<Milestone>>) {
		for milestone in &self.milestones {
			let _ = milestone.evaluate(&self.anchor).await;
		}

		let mut updates = self.anchor.register_listener();
		let collection = Arc::clone(&self);
		let _handle = tokio::spawn(async move {
			loop {
				match updates.recv().await {
					Ok(()) => {
						for milestone in &collection.milestones {
							if milestone.evaluate(&collection.anchor).await {
								if achieved.send(Arc::clone(milestone)).is_err() {
									return;
								}
							}
						}
					}
					Err(broadcast::error::RecvError::Closed) => return,
					Err(broadcast::error::RecvError::Lagged(_)) => continue,
				}
			}
		});
	}
}
