use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::id::ProviderId;

/// Which providers a cycle recomputes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationScope {
	Full,
	Providers(BTreeSet<ProviderId>),
}

impl InvalidationScope {
	pub fn provider(id: impl Into<ProviderId>) -> Self {
		Self::Providers(BTreeSet::from([id.into()]))
	}

	/// `Full` absorbs anything; partial scopes union.
	pub fn merge(&mut self, other: InvalidationScope) {
		match (&mut *self, other) {
			(Self::Full, _) => {}
			(this, Self::Full) => *this = Self::Full,
			(Self::Providers(ids), Self::Providers(more)) => ids.extend(more),
		}
	}

	pub fn includes(&self, id: &ProviderId) -> bool {
		match self {
			Self::Full => true,
			Self::Providers(ids) => ids.contains(id),
		}
	}

	pub fn is_full(&self) -> bool {
		matches!(self, Self::Full)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
	Startup,
	Edit,
	Activated,
	Invalidated,
	SettingsChanged,
	ProvidersChanged,
	GroupDisabled,
	Stale,
}

impl TriggerReason {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Startup => "startup",
			Self::Edit => "edit",
			Self::Activated => "activated",
			Self::Invalidated => "invalidated",
			Self::SettingsChanged => "settings-changed",
			Self::ProvidersChanged => "providers-changed",
			Self::GroupDisabled => "group-disabled",
			Self::Stale => "stale",
		}
	}
}

/// Coalesced triggers waiting for their debounce deadline.
#[derive(Debug, Clone)]
pub struct PendingTrigger {
	pub scope: InvalidationScope,
	/// Most recent reason merged into the slot.
	pub reason: TriggerReason,
	/// When the most recent trigger arrived.
	pub last_at: Instant,
	/// Publish even if no provider executes.
	pub reset: bool,
	/// Number of triggers merged into the slot.
	pub count: u32,
}

impl PendingTrigger {
	pub fn new(scope: InvalidationScope, reason: TriggerReason, reset: bool, now: Instant) -> Self {
		Self {
			scope,
			reason,
			last_at: now,
			reset,
			count: 1,
		}
	}

	/// Merges another trigger and pushes the deadline out.
	pub fn absorb(&mut self, scope: InvalidationScope, reason: TriggerReason, reset: bool, now: Instant) {
		self.scope.merge(scope);
		self.reason = reason;
		self.reset |= reset;
		self.last_at = self.last_at.max(now);
		self.count = self.count.saturating_add(1);
	}

	pub fn deadline(&self, debounce: Duration) -> Instant {
		self.last_at + debounce
	}

	pub fn is_due(&self, now: Instant, debounce: Duration) -> bool {
		now.saturating_duration_since(self.last_at) >= debounce
	}
}

/// Observable state of a document's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
	Idle,
	Queued,
	Running,
}
