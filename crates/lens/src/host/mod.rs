//! Process-level lens orchestration.
//!
//! [`LensHost`] is owned by the editor loop. It keeps one [`LensPipeline`]
//! per visible document, routes edits and invalidations to them, and applies
//! background completions on [`LensHost::tick`].
//!
//! An async main loop typically looks like:
//!
//! ```ignore
//! loop {
//!     host.tick(Instant::now(), &documents);
//!     let sleep = host.next_deadline().map(tokio::time::sleep_until);
//!     tokio::select! {
//!         _ = host.completed(), if host.has_inflight() => {}
//!         _ = async { sleep.unwrap().await }, if sleep.is_some() => {}
//!         event = events.recv() => { /* edits, visibility, settings */ }
//!     }
//! }
//! ```


use std::collections::{BTreeSet, HashMap, VecDeque};
use std::hash::BuildHasher;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc;
use xeno_primitives::{Document, DocumentId, DocumentSnapshot, TextEdit};

use crate::context::Presentation;
use crate::entry::LensEntry;
use crate::error::{LensError, Result};
use crate::id::{AnchorId, GroupId, ProviderId};
use crate::pipeline::{CycleDone, CycleStatus, InvalidationScope, LensPipeline, TriggerReason};
use crate::provider::{ActionContext, SharedProvider, ViewState};
use crate::registry::{ProviderRegistry, ProviderSnapshot};
use crate::settings::LensSettings;
use crate::throttle::ProviderThrottle;
use crate::view::LensView;
use crate::worker::panic_message;

/// Top-level feature state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureState {
	/// No pipelines exist.
	Disabled,
	/// Pipelines for visible documents are created on the next tick.
	Enabling,
	Enabled,
}

/// Read access to current document snapshots.
pub trait DocumentSource {
	fn snapshot(&self, doc: DocumentId) -> Option<DocumentSnapshot>;
}

impl<F> DocumentSource for F
where
	F: Fn(DocumentId) -> Option<DocumentSnapshot>,
{
	fn snapshot(&self, doc: DocumentId) -> Option<DocumentSnapshot> {
		self(doc)
	}
}

impl<S: BuildHasher> DocumentSource for HashMap<DocumentId, Document, S> {
	fn snapshot(&self, doc: DocumentId) -> Option<DocumentSnapshot> {
		self.get(&doc).map(Document::snapshot)
	}
}

/// What one [`LensHost::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickStats {
	pub started: usize,
	pub published: usize,
	pub no_ops: usize,
	/// Cancelled, superseded or outdated completions.
	pub discarded: usize,
	pub resubmitted: usize,
}

pub struct LensHost {
	registry: Arc<ProviderRegistry>,
	/// Snapshot the pipelines were last synced against.
	providers: Arc<ProviderSnapshot>,
	throttle: Arc<ProviderThrottle>,
	settings: LensSettings,
	state: FeatureState,
	visible: FxHashSet<DocumentId>,
	pipelines: FxHashMap<DocumentId, LensPipeline>,
	/// Epoch handed to the next pipeline; completions of torn-down pipelines never match.
	next_epoch: u64,
	view: Box<dyn LensView>,
	completion_tx: mpsc::UnboundedSender<CycleDone>,
	completion_rx: mpsc::UnboundedReceiver<CycleDone>,
	ready: VecDeque<CycleDone>,
}

impl LensHost {
	/// Creates a host with its own registry and throttle.
	///
	/// # Errors
	///
	/// Returns [`LensError::Settings`] if `settings` fail validation.
	pub fn new(settings: LensSettings, view: Box<dyn LensView>) -> Result<Self> {
		let throttle = Arc::new(ProviderThrottle::new(settings.throttle_config()));
		Self::with_shared(settings, view, Arc::new(ProviderRegistry::new()), throttle)
	}

	/// Creates a host sharing a registry and throttle with other hosts.
	pub fn with_shared(
		settings: LensSettings,
		mut view: Box<dyn LensView>,
		registry: Arc<ProviderRegistry>,
		throttle: Arc<ProviderThrottle>,
	) -> Result<Self> {
		settings.validate()?;
		view.set_per_anchor_limits(&settings.anchor_limits);
		let (completion_tx, completion_rx) = mpsc::unbounded_channel();
		let state = if settings.enabled {
			FeatureState::Enabling
		} else {
			FeatureState::Disabled
		};
		Ok(Self {
			providers: registry.snapshot(),
			registry,
			throttle,
			settings,
			state,
			visible: FxHashSet::default(),
			pipelines: FxHashMap::default(),
			next_epoch: 0,
			view,
			completion_tx,
			completion_rx,
			ready: VecDeque::new(),
		})
	}

	pub fn state(&self) -> FeatureState {
		self.state
	}

	pub fn settings(&self) -> &LensSettings {
		&self.settings
	}

	pub fn registry(&self) -> &Arc<ProviderRegistry> {
		&self.registry
	}

	pub fn throttle(&self) -> &Arc<ProviderThrottle> {
		&self.throttle
	}

	pub fn providers(&self) -> &Arc<ProviderSnapshot> {
		&self.providers
	}

	pub fn pipeline(&self, doc: DocumentId) -> Option<&LensPipeline> {
		self.pipelines.get(&doc)
	}

	/// Installs a new provider set and resyncs pipelines against it.
	pub fn install_providers(&mut self, providers: Vec<SharedProvider>) -> Result<()> {
		self.registry.install(providers)?;
		self.sync_registry();
		Ok(())
	}

	/// Picks up a registry snapshot installed since the last sync.
	///
	/// Providers with a new id or a new group are computed in every document
	/// and entries of removed ids are cleared. Continuing ids keep their
	/// entries and are only republished under the new priorities.
	fn sync_registry(&mut self) {
		let snap = self.registry.snapshot();
		if snap.version() == self.providers.version() {
			return;
		}
		let old = std::mem::replace(&mut self.providers, Arc::clone(&snap));

		let changed: BTreeSet<ProviderId> = snap
			.descriptors()
			.filter(|d| old.get(d.id.as_str()).is_none_or(|p| p.descriptor().group_id != d.group_id))
			.map(|d| d.id.clone())
			.collect();
		let removed: FxHashSet<&ProviderId> = old.descriptors().map(|d| &d.id).filter(|id| !snap.contains(id.as_str())).collect();

		tracing::info!(
			version = snap.version(),
			providers = snap.len(),
			changed = changed.len(),
			removed = removed.len(),
			"lens.host.providers_changed"
		);

		let now = Instant::now();
		for pipeline in self.pipelines.values_mut() {
			pipeline.mark_dirty();
			let shows_removed = pipeline.context().any_entry(|e| removed.contains(&e.provider_id));
			if !changed.is_empty() || shows_removed {
				pipeline.request(InvalidationScope::Providers(changed.clone()), TriggerReason::ProvidersChanged, now);
			}
		}
	}

	/// Switches the whole feature on or off.
	pub fn set_enabled(&mut self, enabled: bool) {
		self.settings.enabled = enabled;
		self.transition(enabled);
	}

	fn transition(&mut self, enabled: bool) {
		match (self.state, enabled) {
			(FeatureState::Disabled, true) => {
				self.state = FeatureState::Enabling;
				tracing::info!("lens.host.enabling");
			}
			(FeatureState::Enabling | FeatureState::Enabled, false) => {
				for (_, mut pipeline) in self.pipelines.drain() {
					pipeline.teardown(self.view.as_mut());
				}
				self.ready.clear();
				self.state = FeatureState::Disabled;
				tracing::info!("lens.host.disabled");
			}
			_ => {}
		}
	}

	/// Applies new settings, diffing against the current ones.
	///
	/// # Errors
	///
	/// Returns [`LensError::Settings`] if `settings` fail validation; nothing is applied.
	pub fn apply_settings(&mut self, settings: LensSettings) -> Result<()> {
		settings.validate()?;
		let old = std::mem::replace(&mut self.settings, settings);
		let now = Instant::now();

		if old.anchor_limits != self.settings.anchor_limits {
			self.view.set_per_anchor_limits(&self.settings.anchor_limits);
		}
		if old.throttle != self.settings.throttle {
			self.throttle.set_config(self.settings.throttle_config());
		}

		let presentation = Presentation {
			providers: &self.providers,
			settings: &self.settings,
		};
		for group in self.settings.disabled_groups.difference(&old.disabled_groups) {
			let group = GroupId::new(group.as_str());
			self.throttle.forget(&group);
			tracing::info!(group = %group, "lens.host.group_disabled");
			for pipeline in self.pipelines.values_mut() {
				if pipeline.context().has_group(&group, &presentation) {
					pipeline.request_reset(TriggerReason::GroupDisabled, now);
				}
			}
		}

		let reenabled: BTreeSet<ProviderId> = self
			.providers
			.descriptors()
			.filter(|d| {
				let group = d.group_id.as_str();
				old.is_group_disabled(group) && !self.settings.is_group_disabled(group)
			})
			.map(|d| d.id.clone())
			.collect();
		if !reenabled.is_empty() {
			for pipeline in self.pipelines.values_mut() {
				pipeline.request(InvalidationScope::Providers(reenabled.clone()), TriggerReason::SettingsChanged, now);
			}
		}

		if old.default_anchor != self.settings.default_anchor || old.group_anchors != self.settings.group_anchors {
			for pipeline in self.pipelines.values_mut() {
				pipeline.mark_dirty();
			}
		}

		self.transition(self.settings.enabled);
		Ok(())
	}

	pub fn disable_group(&mut self, group: &str) -> Result<()> {
		let mut settings = self.settings.clone();
		settings.disabled_groups.insert(group.to_string());
		self.apply_settings(settings)
	}

	pub fn enable_group(&mut self, group: &str) -> Result<()> {
		let mut settings = self.settings.clone();
		settings.disabled_groups.remove(group);
		self.apply_settings(settings)
	}

	/// Marks `doc` visible (creating its pipeline) or hidden (tearing it down).
	pub fn set_visible(&mut self, doc: DocumentId, visible: bool) {
		if visible {
			self.visible.insert(doc);
			if self.state == FeatureState::Enabled {
				self.ensure_pipeline(doc, TriggerReason::Activated);
			}
		} else {
			self.visible.remove(&doc);
			if let Some(mut pipeline) = self.pipelines.remove(&doc) {
				pipeline.teardown(self.view.as_mut());
			}
		}
	}

	pub fn close_document(&mut self, doc: DocumentId) {
		self.set_visible(doc, false);
	}

	fn ensure_pipeline(&mut self, doc: DocumentId, reason: TriggerReason) {
		if self.pipelines.contains_key(&doc) {
			return;
		}
		self.next_epoch += 1;
		let mut pipeline = LensPipeline::with_epoch(doc, self.next_epoch);
		pipeline.request(InvalidationScope::Full, reason, Instant::now());
		self.pipelines.insert(doc, pipeline);
		tracing::debug!(doc = doc.0, epoch = self.next_epoch, reason = reason.as_str(), "lens.host.pipeline_created");
	}

	/// Requests a full cycle for a document that became active.
	pub fn activate(&mut self, doc: DocumentId) {
		if let Some(pipeline) = self.pipelines.get_mut(&doc) {
			pipeline.request(InvalidationScope::Full, TriggerReason::Activated, Instant::now());
		}
	}

	pub fn on_edit(&mut self, doc: DocumentId, edit: &TextEdit) {
		if let Some(pipeline) = self.pipelines.get_mut(&doc) {
			pipeline.on_edit(edit, Instant::now());
		}
	}

	pub fn set_view_state(&mut self, doc: DocumentId, view_state: ViewState) {
		if let Some(pipeline) = self.pipelines.get_mut(&doc) {
			pipeline.set_view_state(view_state);
		}
	}

	pub fn invalidate_all(&mut self) {
		let now = Instant::now();
		for pipeline in self.pipelines.values_mut() {
			pipeline.request(InvalidationScope::Full, TriggerReason::Invalidated, now);
		}
	}

	/// Recomputes one provider in every document.
	pub fn invalidate_provider(&mut self, id: &str) {
		let now = Instant::now();
		for pipeline in self.pipelines.values_mut() {
			pipeline.request(InvalidationScope::provider(id), TriggerReason::Invalidated, now);
		}
	}

	pub fn invalidate(&mut self, doc: DocumentId, scope: InvalidationScope) -> Result<()> {
		let pipeline = self.pipelines.get_mut(&doc).ok_or(LensError::UnknownDocument(doc))?;
		pipeline.request(scope, TriggerReason::Invalidated, Instant::now());
		Ok(())
	}

	/// Drives the scheduler: applies completions, republishes, starts due cycles.
	///
	/// `now` is only compared against debounce deadlines; triggers raised
	/// during the tick are stamped with the wall clock.
	pub fn tick(&mut self, now: Instant, docs: &impl DocumentSource) -> TickStats {
		let mut stats = TickStats::default();
		self.sync_registry();

		if self.state == FeatureState::Enabling {
			let visible: Vec<DocumentId> = self.visible.iter().copied().collect();
			for doc in visible {
				self.ensure_pipeline(doc, TriggerReason::Startup);
			}
			self.state = FeatureState::Enabled;
			tracing::info!(documents = self.pipelines.len(), "lens.host.enabled");
		}

		while let Ok(done) = self.completion_rx.try_recv() {
			self.ready.push_back(done);
		}

		let presentation = Presentation {
			providers: &self.providers,
			settings: &self.settings,
		};
		for done in self.ready.drain(..) {
			let Some(pipeline) = self.pipelines.get_mut(&done.doc_id) else {
				stats.discarded += 1;
				continue;
			};
			let snapshot = docs.snapshot(done.doc_id);
			match pipeline.complete(done, self.view.as_mut(), &presentation, snapshot.as_ref(), Instant::now()) {
				CycleStatus::Published { .. } => stats.published += 1,
				CycleStatus::NoOp => stats.no_ops += 1,
				CycleStatus::Cancelled | CycleStatus::Stale => stats.discarded += 1,
			}
		}

		let debounce = self.settings.debounce();
		for (&doc, pipeline) in self.pipelines.iter_mut() {
			let Some(snapshot) = docs.snapshot(doc) else {
				continue;
			};
			if pipeline.resubmit_if_needed(self.view.as_mut(), &presentation, &snapshot) {
				stats.resubmitted += 1;
			}
			if pipeline.is_due(now, debounce)
				&& pipeline
					.start(snapshot, &presentation, &self.throttle, &self.completion_tx)
					.is_some()
			{
				stats.started += 1;
			}
		}

		if stats != TickStats::default() {
			tracing::trace!(
				started = stats.started,
				published = stats.published,
				no_ops = stats.no_ops,
				discarded = stats.discarded,
				"lens.host.tick"
			);
		}
		stats
	}

	/// Earliest debounce deadline across documents.
	pub fn next_deadline(&self) -> Option<Instant> {
		let debounce = self.settings.debounce();
		self.pipelines.values().filter_map(|p| p.next_deadline(debounce)).min()
	}

	pub fn has_inflight(&self) -> bool {
		self.pipelines.values().any(LensPipeline::has_inflight)
	}

	/// Waits for the next background completion; it is applied on the next tick.
	///
	/// Never resolves while nothing is in flight.
	pub async fn completed(&mut self) {
		if let Some(done) = self.completion_rx.recv().await {
			self.ready.push_back(done);
		}
	}

	/// Dispatches a click on `anchor` to its provider.
	///
	/// A panicking handler is logged and does not reach the caller.
	pub fn click(&self, doc: DocumentId, anchor: AnchorId) -> Result<()> {
		let (provider, cx, entry) = self.resolve_action(doc, anchor)?;
		tracing::debug!(doc = doc.0, provider = %entry.provider_id, "lens.host.click");
		if let Err(payload) = catch_unwind(AssertUnwindSafe(|| provider.handle_click(&cx, entry))) {
			tracing::warn!(
				doc = doc.0,
				provider = %entry.provider_id,
				error = %panic_message(payload.as_ref()),
				"lens.provider.click_panicked"
			);
		}
		Ok(())
	}

	/// Dispatches an extra action of `anchor` to its provider.
	pub fn extra_action(&self, doc: DocumentId, anchor: AnchorId, action_id: &str) -> Result<()> {
		let (provider, cx, entry) = self.resolve_action(doc, anchor)?;
		tracing::debug!(doc = doc.0, provider = %entry.provider_id, action = action_id, "lens.host.extra_action");
		if let Err(payload) = catch_unwind(AssertUnwindSafe(|| provider.handle_extra_action(&cx, entry, action_id))) {
			tracing::warn!(
				doc = doc.0,
				provider = %entry.provider_id,
				action = action_id,
				error = %panic_message(payload.as_ref()),
				"lens.provider.click_panicked"
			);
		}
		Ok(())
	}

	fn resolve_action(&self, doc: DocumentId, anchor: AnchorId) -> Result<(&SharedProvider, ActionContext, &LensEntry)> {
		let pipeline = self.pipelines.get(&doc).ok_or(LensError::UnknownDocument(doc))?;
		let (found, entry) = pipeline.context().anchor(anchor).ok_or(LensError::UnknownAnchor { doc, anchor })?;
		let provider = self
			.providers
			.get(entry.provider_id.as_str())
			.ok_or_else(|| LensError::UnknownProvider(entry.provider_id.clone()))?;
		let cx = ActionContext {
			doc_id: doc,
			anchor,
			range: found.range,
		};
		Ok((provider, cx, entry))
	}

	/// Expands the line group at or before `offset`. Returns false when there is none.
	pub fn show_more(&mut self, doc: DocumentId, offset: usize) -> bool {
		self.pipelines
			.get_mut(&doc)
			.is_some_and(|pipeline| pipeline.context_mut().invoke_more(offset))
	}

	pub fn has_provider_lens(&self, doc: DocumentId, id: &str) -> bool {
		self.pipelines.get(&doc).is_some_and(|pipeline| pipeline.context().has_provider(id))
	}
}
