//! Per-document debounced computation pipeline.
//!
//! # Lifecycle
//!
//! Triggers coalesce into a single pending slot ([`PendingTrigger`]). When its
//! debounce deadline passes, the host calls [`LensPipeline::start`]: the
//! pending slot is consumed, any in-flight generation is cancelled, providers
//! are precomputed on the foreground, and the rest of the cycle runs on the
//! blocking pool. The result comes back through the host's completion channel
//! and is applied by [`LensPipeline::complete`].
//!
//! # Staleness
//!
//! A completion is only applied when it comes from this pipeline instance
//! (its epoch), its generation is still the in-flight one, its token was not
//! cancelled, and the document version still matches the snapshot it was
//! computed from. Anything else is dropped.
//!
//! # Merge
//!
//! Providers that executed replace their previous entries. Entries of
//! disabled or unregistered providers are removed. Everything else keeps its
//! tracked position.

mod cycle;
#[cfg(test)]
mod tests;
mod trigger;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use cycle::{CycleDone, CycleOutput, CycleRequest, PreparedProvider, run_cycle};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
pub use trigger::{InvalidationScope, PendingTrigger, PipelinePhase, TriggerReason};
use xeno_primitives::{DocumentId, DocumentSnapshot, TextEdit};

use crate::context::{LensContext, Presentation};
use crate::entry::{LensEntry, RawResult};
use crate::id::ProviderId;
use crate::provider::{PrecomputeContext, ViewState};
use crate::throttle::ProviderThrottle;
use crate::view::LensView;
use crate::worker::{self, CancelFlag, panic_message};

/// Outcome of applying a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
	/// Results were merged and republished.
	Published { generation: u64, anchors: usize },
	/// Nothing executed and nothing had to be removed; published state untouched.
	NoOp,
	/// The generation was cancelled before finishing.
	Cancelled,
	/// Superseded generation or outdated snapshot.
	Stale,
}

#[derive(Debug)]
struct InFlight {
	generation: u64,
	cancel: CancelFlag,
	scope: InvalidationScope,
	reset: bool,
	snapshot_version: u64,
}

pub struct LensPipeline {
	doc_id: DocumentId,
	epoch: u64,
	context: LensContext,
	pending: Option<PendingTrigger>,
	inflight: Option<InFlight>,
	generation: u64,
	view_state: ViewState,
	needs_resubmit: bool,
}

impl LensPipeline {
	pub fn new(doc_id: DocumentId) -> Self {
		Self::with_epoch(doc_id, 0)
	}

	/// Creates a pipeline whose completions are told apart from those of
	/// earlier pipelines of the same document by `epoch`.
	pub fn with_epoch(doc_id: DocumentId, epoch: u64) -> Self {
		Self {
			doc_id,
			epoch,
			context: LensContext::new(doc_id),
			pending: None,
			inflight: None,
			generation: 0,
			view_state: ViewState::default(),
			needs_resubmit: false,
		}
	}

	pub fn doc_id(&self) -> DocumentId {
		self.doc_id
	}

	pub fn epoch(&self) -> u64 {
		self.epoch
	}

	pub fn context(&self) -> &LensContext {
		&self.context
	}

	pub fn context_mut(&mut self) -> &mut LensContext {
		&mut self.context
	}

	/// Last generation started.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn phase(&self) -> PipelinePhase {
		if self.pending.is_some() {
			PipelinePhase::Queued
		} else if self.inflight.is_some() {
			PipelinePhase::Running
		} else {
			PipelinePhase::Idle
		}
	}

	pub fn pending(&self) -> Option<&PendingTrigger> {
		self.pending.as_ref()
	}

	pub fn has_inflight(&self) -> bool {
		self.inflight.is_some()
	}

	pub fn view_state(&self) -> ViewState {
		self.view_state
	}

	pub fn set_view_state(&mut self, view_state: ViewState) {
		self.view_state = view_state;
	}

	pub fn request(&mut self, scope: InvalidationScope, reason: TriggerReason, now: Instant) {
		self.enqueue(scope, reason, false, now);
	}

	/// Full cycle that publishes even if no provider executes.
	pub fn request_reset(&mut self, reason: TriggerReason, now: Instant) {
		self.enqueue(InvalidationScope::Full, reason, true, now);
	}

	fn enqueue(&mut self, scope: InvalidationScope, reason: TriggerReason, reset: bool, now: Instant) {
		match &mut self.pending {
			Some(pending) => pending.absorb(scope, reason, reset, now),
			None => self.pending = Some(PendingTrigger::new(scope, reason, reset, now)),
		}
		tracing::trace!(doc = self.doc_id.0, reason = reason.as_str(), reset, "lens.pipeline.queued");
	}

	/// Tracks anchors through `edit`, cancels the in-flight generation and queues a full cycle.
	pub fn on_edit(&mut self, edit: &TextEdit, now: Instant) {
		let dropped = self.context.on_edit(edit);
		if dropped > 0 || !self.context.is_empty() {
			self.needs_resubmit = true;
		}

		let mut reset = false;
		if let Some(inflight) = self.inflight.take() {
			inflight.cancel.cancel();
			reset = inflight.reset;
			tracing::debug!(doc = self.doc_id.0, generation = inflight.generation, "lens.cycle.cancelled_by_edit");
		}
		self.enqueue(InvalidationScope::Full, TriggerReason::Edit, reset, now);
	}

	pub fn is_due(&self, now: Instant, debounce: Duration) -> bool {
		self.pending.as_ref().is_some_and(|p| p.is_due(now, debounce))
	}

	pub fn next_deadline(&self, debounce: Duration) -> Option<Instant> {
		self.pending.as_ref().map(|p| p.deadline(debounce))
	}

	/// Consumes the pending trigger and spawns a new generation.
	///
	/// Returns the started generation, or `None` when nothing was pending.
	pub fn start(
		&mut self,
		snapshot: DocumentSnapshot,
		presentation: &Presentation<'_>,
		throttle: &Arc<ProviderThrottle>,
		completions: &mpsc::UnboundedSender<CycleDone>,
	) -> Option<u64> {
		let pending = self.pending.take()?;
		let mut scope = pending.scope;
		let mut reset = pending.reset;

		if let Some(previous) = self.inflight.take() {
			previous.cancel.cancel();
			scope.merge(previous.scope);
			reset |= previous.reset;
			tracing::debug!(doc = self.doc_id.0, generation = previous.generation, "lens.cycle.superseded");
		}

		self.generation += 1;
		let generation = self.generation;
		let cancel = CancelFlag::new();

		let precompute_cx = PrecomputeContext {
			snapshot: &snapshot,
			view: self.view_state,
		};
		let mut providers = Vec::new();
		for provider in presentation.providers.ordered() {
			let descriptor = provider.descriptor();
			if !scope.includes(&descriptor.id) || presentation.settings.is_group_disabled(descriptor.group_id.as_str()) {
				continue;
			}
			match catch_unwind(AssertUnwindSafe(|| provider.is_available(&snapshot))) {
				Ok(true) => {}
				Ok(false) => continue,
				Err(payload) => {
					tracing::warn!(
						doc = self.doc_id.0,
						generation,
						provider = %descriptor.id,
						error = %panic_message(payload.as_ref()),
						"lens.provider.availability_panicked"
					);
					continue;
				}
			}
			match catch_unwind(AssertUnwindSafe(|| provider.precompute(&precompute_cx))) {
				Ok(ui) => providers.push(PreparedProvider {
					provider: Arc::clone(provider),
					ui,
				}),
				Err(payload) => {
					tracing::warn!(
						doc = self.doc_id.0,
						generation,
						provider = %descriptor.id,
						error = %panic_message(payload.as_ref()),
						"lens.provider.precompute_panicked"
					);
				}
			}
		}

		tracing::debug!(
			doc = self.doc_id.0,
			generation,
			reason = pending.reason.as_str(),
			triggers = pending.count,
			full = scope.is_full(),
			reset,
			providers = providers.len(),
			"lens.cycle.start"
		);

		self.inflight = Some(InFlight {
			generation,
			cancel: cancel.clone(),
			scope,
			reset,
			snapshot_version: snapshot.version(),
		});

		let request = CycleRequest {
			doc_id: self.doc_id,
			epoch: self.epoch,
			generation,
			snapshot,
			providers,
			throttle: Arc::clone(throttle),
			cancel,
		};
		let tx = completions.clone();
		let (doc_id, epoch, snapshot_version) = (self.doc_id, self.epoch, request.snapshot.version());
		let _handle = worker::spawn_blocking(move || {
			let done = catch_unwind(AssertUnwindSafe(|| run_cycle(request))).unwrap_or_else(|payload| {
				tracing::warn!(
					doc = doc_id.0,
					generation,
					error = %panic_message(payload.as_ref()),
					"lens.cycle.panicked"
				);
				CycleDone {
					doc_id,
					epoch,
					generation,
					snapshot_version,
					output: CycleOutput::default(),
				}
			});
			let _ = tx.send(done);
		});

		Some(generation)
	}

	/// Applies a completion from the background.
	///
	/// `snapshot` is the current document state; `None` means the document is gone.
	pub fn complete(
		&mut self,
		done: CycleDone,
		view: &mut dyn LensView,
		presentation: &Presentation<'_>,
		snapshot: Option<&DocumentSnapshot>,
		now: Instant,
	) -> CycleStatus {
		let current = done.epoch == self.epoch;
		let Some(inflight) = self.inflight.take_if(|f| current && f.generation == done.generation) else {
			tracing::debug!(
				doc = self.doc_id.0,
				epoch = done.epoch,
				generation = done.generation,
				"lens.cycle.discarded"
			);
			return CycleStatus::Stale;
		};

		if inflight.cancel.is_cancelled() || done.output.cancelled {
			tracing::debug!(doc = self.doc_id.0, generation = done.generation, "lens.cycle.cancelled");
			if inflight.reset {
				self.request_reset(TriggerReason::Stale, now);
			}
			return CycleStatus::Cancelled;
		}

		let Some(snapshot) = snapshot.filter(|s| s.version() == inflight.snapshot_version) else {
			tracing::debug!(
				doc = self.doc_id.0,
				generation = done.generation,
				version = done.snapshot_version,
				"lens.cycle.stale_snapshot"
			);
			self.enqueue(inflight.scope, TriggerReason::Stale, inflight.reset, now);
			return CycleStatus::Stale;
		};

		let orphaned = |entry: &LensEntry| match presentation.providers.get(entry.provider_id.as_str()) {
			Some(provider) => presentation.settings.is_group_disabled(provider.descriptor().group_id.as_str()),
			None => true,
		};

		let output = done.output;
		if output.computed.is_empty() && !inflight.reset && !self.context.any_entry(orphaned) {
			tracing::debug!(
				doc = self.doc_id.0,
				generation = done.generation,
				skipped = output.skipped.len(),
				failed = output.failed.len(),
				"lens.cycle.noop"
			);
			return CycleStatus::NoOp;
		}

		let executed: FxHashSet<&ProviderId> = output.computed.iter().map(|(id, _)| id).collect();
		let mut merged: Vec<RawResult> = self
			.context
			.results()
			.into_iter()
			.filter(|(_, entry)| !executed.contains(&entry.provider_id) && !orphaned(entry))
			.collect();
		let kept = merged.len();
		for (_, results) in output.computed {
			merged.extend(results);
		}

		let stats = self.context.set_results(merged, snapshot);
		self.context.resubmit(view, presentation, snapshot);
		self.needs_resubmit = false;

		tracing::debug!(
			doc = self.doc_id.0,
			generation = done.generation,
			kept,
			anchors = self.context.len(),
			created = stats.created,
			"lens.cycle.published"
		);
		CycleStatus::Published {
			generation: done.generation,
			anchors: self.context.len(),
		}
	}

	/// Forces the next [`Self::resubmit_if_needed`] to republish.
	pub fn mark_dirty(&mut self) {
		self.needs_resubmit = true;
	}

	/// Republishes when edits or presentation changes left the view out of date.
	pub fn resubmit_if_needed(&mut self, view: &mut dyn LensView, presentation: &Presentation<'_>, snapshot: &DocumentSnapshot) -> bool {
		if !self.needs_resubmit {
			return false;
		}
		self.context.resubmit(view, presentation, snapshot);
		self.needs_resubmit = false;
		true
	}

	/// Cancels in-flight work, drops the pending trigger and disposes every anchor.
	pub fn teardown(&mut self, view: &mut dyn LensView) {
		self.pending = None;
		if let Some(inflight) = self.inflight.take() {
			inflight.cancel.cancel();
		}
		self.context.clear(view);
		self.needs_resubmit = false;
		tracing::debug!(doc = self.doc_id.0, "lens.pipeline.teardown");
	}
}
