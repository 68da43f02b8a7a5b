//! In-memory view and provider doubles for tests and demos.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use xeno_primitives::{DocumentId, DocumentRange, DocumentSnapshot};

use crate::descriptor::ProviderDescriptor;
use crate::entry::{LensEntry, RawResult};
use crate::error::ProviderError;
use crate::provider::{ActionContext, ComputeContext, LensProvider, UiData};
use crate::settings::AnchorLimits;
use crate::view::{LensGroup, LensView, MoreHandler, ViewGeneration};

/// One published line group.
#[derive(Debug, Clone)]
pub struct PublishedGroup {
	pub generation: ViewGeneration,
	pub range: DocumentRange,
	pub group: LensGroup,
}

#[derive(Debug, Default)]
pub struct ViewLog {
	pub limits: Option<AnchorLimits>,
	pub limit_updates: usize,
	pub batches: usize,
	pub open_batches: usize,
	pub published: FxHashMap<DocumentId, Vec<PublishedGroup>>,
	pub retired: Vec<(DocumentId, ViewGeneration)>,
	pub more_calls: Vec<(DocumentId, DocumentRange, usize)>,
}

/// [`LensView`] that records everything it is told. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingView {
	log: Arc<Mutex<ViewLog>>,
}

impl RecordingView {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_log<R>(&self, f: impl FnOnce(&ViewLog) -> R) -> R {
		f(&self.log.lock())
	}

	/// Groups currently shown for `doc`, in publication order.
	pub fn shown(&self, doc: DocumentId) -> Vec<PublishedGroup> {
		self.log.lock().published.get(&doc).cloned().unwrap_or_default()
	}

	/// Texts currently shown for `doc`, flattened in line, kind and priority order.
	pub fn texts(&self, doc: DocumentId) -> Vec<String> {
		self.shown(doc)
			.iter()
			.flat_map(|g| g.group.values().flatten().map(|l| l.entry.text.clone()).collect::<Vec<_>>())
			.collect()
	}

	pub fn batches(&self) -> usize {
		self.log.lock().batches
	}

	pub fn more_calls(&self) -> Vec<(DocumentId, DocumentRange, usize)> {
		self.log.lock().more_calls.clone()
	}

	pub fn limits(&self) -> Option<AnchorLimits> {
		self.log.lock().limits
	}
}

impl LensView for RecordingView {
	fn set_per_anchor_limits(&mut self, limits: &AnchorLimits) {
		let mut log = self.log.lock();
		log.limits = Some(*limits);
		log.limit_updates += 1;
	}

	fn begin_batch(&mut self, _doc: DocumentId) {
		let mut log = self.log.lock();
		log.batches += 1;
		log.open_batches += 1;
	}

	fn add_entries(&mut self, generation: ViewGeneration, doc: DocumentId, range: DocumentRange, group: &LensGroup) -> MoreHandler {
		self.log.lock().published.entry(doc).or_default().push(PublishedGroup {
			generation,
			range,
			group: group.clone(),
		});
		let log = Arc::clone(&self.log);
		Box::new(move |offset| log.lock().more_calls.push((doc, range, offset)))
	}

	fn retire(&mut self, doc: DocumentId, generation: ViewGeneration) {
		let mut log = self.log.lock();
		if let Some(groups) = log.published.get_mut(&doc) {
			groups.retain(|g| g.generation != generation);
		}
		log.retired.push((doc, generation));
	}

	fn end_batch(&mut self, _doc: DocumentId) {
		let mut log = self.log.lock();
		log.open_batches = log.open_batches.saturating_sub(1);
	}
}

/// Provider entry point a [`StaticProvider`] can be told to panic in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
	IsAvailable,
	ShouldRecompute,
	Compute,
	Click,
}

/// Provider returning a settable list of results.
pub struct StaticProvider {
	descriptor: ProviderDescriptor,
	results: Mutex<Vec<RawResult>>,
	available: AtomicBool,
	recompute: AtomicBool,
	calls: AtomicUsize,
	clicks: Mutex<Vec<(String, Option<String>)>>,
	panics_in: Mutex<Option<Hook>>,
}

impl StaticProvider {
	pub fn new(descriptor: ProviderDescriptor) -> Self {
		Self {
			descriptor,
			results: Mutex::new(Vec::new()),
			available: AtomicBool::new(true),
			recompute: AtomicBool::new(true),
			calls: AtomicUsize::new(0),
			clicks: Mutex::new(Vec::new()),
			panics_in: Mutex::new(None),
		}
	}

	/// Adds one entry with `text` at `range`.
	pub fn with_lens(self, range: impl Into<DocumentRange>, text: &str) -> Self {
		self.push(range, text);
		self
	}

	pub fn push(&self, range: impl Into<DocumentRange>, text: &str) {
		let entry = LensEntry::new(self.descriptor.id.clone(), text);
		self.results.lock().push((range.into(), entry));
	}

	pub fn set_results(&self, results: Vec<RawResult>) {
		*self.results.lock() = results;
	}

	/// Replaces the results with single-text entries.
	pub fn set_lenses(&self, lenses: &[(std::ops::Range<usize>, &str)]) {
		let id = &self.descriptor.id;
		*self.results.lock() = lenses
			.iter()
			.map(|(range, text)| (DocumentRange::from(range.clone()), LensEntry::new(id.clone(), *text)))
			.collect();
	}

	pub fn set_available(&self, available: bool) {
		self.available.store(available, Ordering::Release);
	}

	pub fn set_recompute(&self, recompute: bool) {
		self.recompute.store(recompute, Ordering::Release);
	}

	/// Makes `hook` panic from now on; `None` restores normal behaviour.
	pub fn set_panic(&self, hook: Option<Hook>) {
		*self.panics_in.lock() = hook;
	}

	fn trip(&self, hook: Hook) {
		if *self.panics_in.lock() == Some(hook) {
			panic!("{} panicked in {hook:?}", self.descriptor.id);
		}
	}

	/// Number of `compute` invocations so far.
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::Acquire)
	}

	/// Clicked entries as `(text, extra action id)`.
	pub fn clicks(&self) -> Vec<(String, Option<String>)> {
		self.clicks.lock().clone()
	}
}

impl LensProvider for StaticProvider {
	fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	fn is_available(&self, _snapshot: &DocumentSnapshot) -> bool {
		self.trip(Hook::IsAvailable);
		self.available.load(Ordering::Acquire)
	}

	fn should_recompute(&self, _snapshot: &DocumentSnapshot, _ui: &UiData) -> bool {
		self.trip(Hook::ShouldRecompute);
		self.recompute.load(Ordering::Acquire)
	}

	fn compute(&self, _cx: &ComputeContext<'_>, _ui: &UiData) -> Result<Vec<RawResult>, ProviderError> {
		self.calls.fetch_add(1, Ordering::AcqRel);
		self.trip(Hook::Compute);
		Ok(self.results.lock().clone())
	}

	fn handle_click(&self, _cx: &ActionContext, entry: &LensEntry) {
		self.trip(Hook::Click);
		self.clicks.lock().push((entry.text.clone(), None));
	}

	fn handle_extra_action(&self, _cx: &ActionContext, entry: &LensEntry, action_id: &str) {
		self.trip(Hook::Click);
		self.clicks.lock().push((entry.text.clone(), Some(action_id.to_string())));
	}
}

type ComputeFn = dyn Fn(&ComputeContext<'_>, &UiData) -> Result<Vec<RawResult>, ProviderError> + Send + Sync;

/// Provider backed by a closure.
pub struct FnProvider {
	descriptor: ProviderDescriptor,
	compute: Box<ComputeFn>,
}

impl FnProvider {
	pub fn new<F>(descriptor: ProviderDescriptor, compute: F) -> Self
	where
		F: Fn(&ComputeContext<'_>, &UiData) -> Result<Vec<RawResult>, ProviderError> + Send + Sync + 'static,
	{
		Self {
			descriptor,
			compute: Box::new(compute),
		}
	}
}

impl LensProvider for FnProvider {
	fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	fn compute(&self, cx: &ComputeContext<'_>, ui: &UiData) -> Result<Vec<RawResult>, ProviderError> {
		(self.compute)(cx, ui)
	}
}
