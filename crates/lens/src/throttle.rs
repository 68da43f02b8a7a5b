//! Heuristic exclusion of chronically slow provider groups.
//!
//! Every provider invocation reports its wall time. A group whose runs keep
//! crossing the significant threshold accumulates a relaxed average
//! (`avg' = (avg + elapsed) / 2`) and is skipped while that average stays at
//! or above the threshold. A fast run below the recovery threshold evicts the
//! record, so an occasional spike never blacklists a group for good.

use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::id::GroupId;

/// Time a single run must take before a group starts being tracked.
pub const DEFAULT_SIGNIFICANT_TIME: Duration = Duration::from_secs(30);

/// Runs faster than this clear a group's record.
pub const DEFAULT_RECOVERY_TIME: Duration = Duration::from_secs(10);

/// Throttle thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
	pub significant: Duration,
	pub recovery: Duration,
}

impl Default for ThrottleConfig {
	fn default() -> Self {
		Self {
			significant: DEFAULT_SIGNIFICANT_TIME,
			recovery: DEFAULT_RECOVERY_TIME,
		}
	}
}

/// Snapshot of one tracked group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleRecord {
	pub group_id: GroupId,
	pub average_nanos: u64,
}

#[derive(Debug, Default)]
struct ThrottleState {
	config: ThrottleConfig,
	averages: FxHashMap<GroupId, u64>,
}

/// Process-wide slow-group table.
///
/// Read concurrently by every background cycle; writes are serialized.
#[derive(Debug, Default)]
pub struct ProviderThrottle {
	state: RwLock<ThrottleState>,
}

fn nanos(d: Duration) -> u64 {
	u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl ProviderThrottle {
	pub fn new(config: ThrottleConfig) -> Self {
		Self {
			state: RwLock::new(ThrottleState {
				config,
				averages: FxHashMap::default(),
			}),
		}
	}

	pub fn config(&self) -> ThrottleConfig {
		self.state.read().config
	}

	/// Replaces the thresholds; existing averages are kept and judged against the new ones.
	pub fn set_config(&self, config: ThrottleConfig) {
		self.state.write().config = config;
	}

	/// Records one run of `group`.
	pub fn report(&self, group: &GroupId, elapsed: Duration) {
		let mut state = self.state.write();
		let significant = state.config.significant;
		let recovery = state.config.recovery;
		let elapsed_nanos = nanos(elapsed);

		if elapsed < recovery {
			if state.averages.remove(group).is_some() {
				tracing::debug!(group = %group, elapsed_ms = elapsed.as_millis() as u64, "lens.throttle.recovered");
			}
			return;
		}

		// Runs between the two thresholds neither record nor recover.
		if elapsed < significant {
			return;
		}
		match state.averages.get_mut(group) {
			Some(avg) => {
				*avg = ((u128::from(*avg) + u128::from(elapsed_nanos)) / 2) as u64;
				tracing::debug!(group = %group, average_ms = *avg / 1_000_000, "lens.throttle.averaged");
			}
			None => {
				state.averages.insert(group.clone(), elapsed_nanos);
				tracing::debug!(group = %group, elapsed_ms = elapsed.as_millis() as u64, "lens.throttle.tracked");
			}
		}
	}

	/// Returns false while `group`'s average is at or above the significant threshold.
	pub fn should_consider(&self, group: &GroupId) -> bool {
		let state = self.state.read();
		match state.averages.get(group) {
			Some(&avg) => avg < nanos(state.config.significant),
			None => true,
		}
	}

	/// Forgets `group` (used when the group gets disabled by policy).
	pub fn forget(&self, group: &GroupId) {
		if self.state.write().averages.remove(group).is_some() {
			tracing::debug!(group = %group, "lens.throttle.dropped");
		}
	}

	/// Current average for `group`, if tracked.
	pub fn average(&self, group: &GroupId) -> Option<Duration> {
		self.state.read().averages.get(group).map(|&n| Duration::from_nanos(n))
	}

	/// Returns all records sorted by group id.
	pub fn records(&self) -> Vec<ThrottleRecord> {
		let state = self.state.read();
		let mut records: Vec<_> = state
			.averages
			.iter()
			.map(|(group_id, &average_nanos)| ThrottleRecord {
				group_id: group_id.clone(),
				average_nanos,
			})
			.collect();
		records.sort_by(|a, b| a.group_id.cmp(&b.group_id));
		records
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;

	fn secs(s: u64) -> Duration {
		Duration::from_secs(s)
	}

	#[test]
	fn slow_run_excludes_group_and_fast_run_recovers_it() {
		let throttle = ProviderThrottle::default();
		let g = GroupId::new("g");

		throttle.report(&g, secs(40));
		assert!(!throttle.should_consider(&g));

		throttle.report(&g, secs(5));
		assert!(throttle.should_consider(&g));
		assert_eq!(throttle.average(&g), None);
	}

	#[test]
	fn significant_runs_are_averaged() {
		let throttle = ProviderThrottle::default();
		let g = GroupId::new("g");

		throttle.report(&g, secs(40));
		throttle.report(&g, secs(30));
		assert_eq!(throttle.average(&g), Some(secs(35)));
		assert!(!throttle.should_consider(&g));
	}

	#[test]
	fn moderate_runs_leave_an_existing_record_untouched() {
		let throttle = ProviderThrottle::default();
		let g = GroupId::new("g");

		throttle.report(&g, secs(40));
		throttle.report(&g, secs(20));
		throttle.report(&g, secs(10));
		assert_eq!(throttle.average(&g), Some(secs(40)));
		assert!(!throttle.should_consider(&g));
	}

	#[test]
	fn moderate_run_without_record_is_ignored() {
		let throttle = ProviderThrottle::default();
		let g = GroupId::new("g");
		throttle.report(&g, secs(15));
		assert!(throttle.records().is_empty());
	}

	#[test]
	fn forget_clears_group() {
		let throttle = ProviderThrottle::default();
		let g = GroupId::new("g");
		throttle.report(&g, secs(60));
		throttle.forget(&g);
		assert!(throttle.should_consider(&g));
	}

	#[test]
	fn groups_are_tracked_independently() {
		let throttle = ProviderThrottle::new(ThrottleConfig {
			significant: Duration::from_millis(50),
			recovery: Duration::from_millis(10),
		});
		let slow = GroupId::new("slow");
		let fast = GroupId::new("fast");
		throttle.report(&slow, Duration::from_millis(80));
		throttle.report(&fast, Duration::from_millis(1));

		assert!(!throttle.should_consider(&slow));
		assert!(throttle.should_consider(&fast));
		assert_eq!(
			throttle.records(),
			vec![ThrottleRecord {
				group_id: slow,
				average_nanos: 80_000_000,
			}]
		);
	}

	#[test]
	fn concurrent_reports_are_serialized() {
		let throttle = Arc::new(ProviderThrottle::default());
		let handles: Vec<_> = (0..8)
			.map(|i| {
				let throttle = Arc::clone(&throttle);
				std::thread::spawn(move || {
					let g = GroupId::new(format!("g{i}"));
					for _ in 0..100 {
						throttle.report(&g, secs(45));
						assert!(!throttle.should_consider(&g));
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}
		assert_eq!(throttle.records().len(), 8);
	}
}
