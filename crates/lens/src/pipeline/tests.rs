use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use xeno_primitives::{Document, DocumentId, DocumentRange};

use super::*;
use crate::descriptor::ProviderDescriptor;
use crate::error::ProviderError;
use crate::id::AnchorId;
use crate::provider::SharedProvider;
use crate::registry::{ProviderRegistry, ProviderSnapshot};
use crate::settings::LensSettings;
use crate::testing::{FnProvider, Hook, RecordingView, StaticProvider};

const DOC: DocumentId = DocumentId(7);
const WINDOW: Duration = Duration::from_millis(100);

struct Harness {
	pipeline: LensPipeline,
	providers: Arc<ProviderSnapshot>,
	settings: LensSettings,
	throttle: Arc<ProviderThrottle>,
	tx: mpsc::UnboundedSender<CycleDone>,
	rx: mpsc::UnboundedReceiver<CycleDone>,
	view: RecordingView,
	doc: Document,
}

impl Harness {
	fn new(providers: Vec<SharedProvider>) -> Self {
		let registry = ProviderRegistry::new();
		let providers = registry.install(providers).unwrap();
		let (tx, rx) = mpsc::unbounded_channel();
		Self {
			pipeline: LensPipeline::new(DOC),
			providers,
			settings: LensSettings::default(),
			throttle: Arc::new(ProviderThrottle::default()),
			tx,
			rx,
			view: RecordingView::new(),
			doc: Document::new(DOC, "fn one() {}\nfn two() {}\nfn three() {}\n"),
		}
	}

	fn start(&mut self) -> Option<u64> {
		let presentation = Presentation {
			providers: &self.providers,
			settings: &self.settings,
		};
		self.pipeline.start(self.doc.snapshot(), &presentation, &self.throttle, &self.tx)
	}

	async fn recv(&mut self) -> CycleDone {
		self.rx.recv().await.unwrap()
	}

	fn complete(&mut self, done: CycleDone) -> CycleStatus {
		let presentation = Presentation {
			providers: &self.providers,
			settings: &self.settings,
		};
		let snapshot = self.doc.snapshot();
		self.pipeline
			.complete(done, &mut self.view, &presentation, Some(&snapshot), Instant::now())
	}

	/// Queues a full cycle, runs it and applies it.
	async fn cycle(&mut self) -> CycleStatus {
		self.pipeline
			.request(InvalidationScope::Full, TriggerReason::Invalidated, Instant::now());
		self.start().unwrap();
		let done = self.recv().await;
		self.complete(done)
	}

	fn texts(&self) -> Vec<String> {
		self.view.texts(DOC)
	}

	fn anchor_ids(&self) -> Vec<AnchorId> {
		self.pipeline.context().anchors().map(|(a, _)| a.id).collect()
	}
}

fn ordered_provider(descriptor: ProviderDescriptor, lenses: &[(std::ops::Range<usize>, &str)]) -> Arc<StaticProvider> {
	let provider = StaticProvider::new(descriptor);
	provider.set_lenses(lenses);
	Arc::new(provider)
}

fn provider(id: &str, lenses: &[(std::ops::Range<usize>, &str)]) -> Arc<StaticProvider> {
	let provider = StaticProvider::new(ProviderDescriptor::new(id));
	provider.set_lenses(lenses);
	Arc::new(provider)
}

fn shared(provider: &Arc<StaticProvider>) -> SharedProvider {
	Arc::clone(provider) as SharedProvider
}

#[test]
fn triggers_coalesce_until_deadline() {
	let t0 = Instant::now();
	let mut pipeline = LensPipeline::new(DOC);
	assert_eq!(pipeline.phase(), PipelinePhase::Idle);

	pipeline.request(InvalidationScope::provider("a"), TriggerReason::Invalidated, t0);
	pipeline.request(InvalidationScope::provider("b"), TriggerReason::Invalidated, t0 + Duration::from_millis(50));
	assert_eq!(pipeline.phase(), PipelinePhase::Queued);
	assert!(!pipeline.is_due(t0 + Duration::from_millis(120), WINDOW));
	assert!(pipeline.is_due(t0 + Duration::from_millis(150), WINDOW));
	assert_eq!(pipeline.next_deadline(WINDOW), Some(t0 + Duration::from_millis(150)));

	let pending = pipeline.pending().unwrap();
	assert_eq!(pending.count, 2);
	assert!(pending.scope.includes(&ProviderId::new("a")));
	assert!(pending.scope.includes(&ProviderId::new("b")));
}

#[tokio::test]
async fn full_cycle_publishes_in_priority_order() {
	let a = provider("a", &[(0..2, "a0")]);
	let b = provider("b", &[(12..14, "b1")]);
	let mut h = Harness::new(vec![shared(&a), shared(&b)]);

	assert!(h.start().is_none(), "nothing pending");
	let status = h.cycle().await;
	assert_eq!(status, CycleStatus::Published {
		generation: 1,
		anchors: 2,
	});
	assert_eq!(h.texts(), vec!["a0", "b1"]);
	assert_eq!(h.pipeline.phase(), PipelinePhase::Idle);
	assert_eq!((a.calls(), b.calls()), (1, 1));
}

#[tokio::test]
async fn identical_recompute_keeps_anchor_ids() {
	let a = provider("a", &[(0..2, "a0"), (12..14, "a1")]);
	let mut h = Harness::new(vec![shared(&a)]);

	h.cycle().await;
	let first = h.anchor_ids();
	h.cycle().await;
	assert_eq!(h.anchor_ids(), first);
	assert_eq!(h.texts(), vec!["a0", "a1"]);
}

#[tokio::test]
async fn nothing_executed_is_a_noop() {
	let a = provider("a", &[(0..2, "a0")]);
	let mut h = Harness::new(vec![shared(&a)]);
	h.cycle().await;
	let batches = h.view.batches();

	a.set_recompute(false);
	assert_eq!(h.cycle().await, CycleStatus::NoOp);
	assert_eq!(h.view.batches(), batches);
	assert_eq!(h.texts(), vec!["a0"]);
}

#[tokio::test]
async fn superseded_generation_is_discarded() {
	let a = provider("a", &[(0..2, "first")]);
	let mut h = Harness::new(vec![shared(&a)]);

	h.pipeline
		.request(InvalidationScope::Full, TriggerReason::Invalidated, Instant::now());
	let gen1 = h.start().unwrap();
	let first = h.recv().await;
	assert_eq!(first.generation, gen1);

	a.set_lenses(&[(0..2, "second")]);
	h.pipeline
		.request(InvalidationScope::Full, TriggerReason::Invalidated, Instant::now());
	let gen2 = h.start().unwrap();
	let second = h.recv().await;

	assert_eq!(h.complete(first), CycleStatus::Stale);
	assert!(h.texts().is_empty());
	assert_eq!(h.complete(second), CycleStatus::Published {
		generation: gen2,
		anchors: 1,
	});
	assert_eq!(h.texts(), vec!["second"]);
}

#[tokio::test]
async fn outdated_snapshot_is_requeued() {
	let a = provider("a", &[(0..2, "a0")]);
	let mut h = Harness::new(vec![shared(&a)]);

	h.pipeline
		.request(InvalidationScope::Full, TriggerReason::Invalidated, Instant::now());
	h.start().unwrap();
	let done = h.recv().await;

	// Edit the document without telling the pipeline.
	h.doc.insert(0, "// ");
	assert_eq!(h.complete(done), CycleStatus::Stale);
	assert!(h.texts().is_empty());
	assert_eq!(h.pipeline.pending().map(|p| p.reason), Some(TriggerReason::Stale));
}

#[tokio::test]
async fn edit_cancels_inflight_generation() {
	let a = provider("a", &[(0..2, "a0")]);
	let mut h = Harness::new(vec![shared(&a)]);
	h.cycle().await;

	h.pipeline
		.request(InvalidationScope::provider("a"), TriggerReason::Invalidated, Instant::now());
	h.start().unwrap();
	let edit = h.doc.insert(0, "x");
	h.pipeline.on_edit(&edit, Instant::now());

	assert!(!h.pipeline.has_inflight());
	let pending = h.pipeline.pending().unwrap();
	assert!(pending.scope.is_full());
	assert_eq!(pending.reason, TriggerReason::Edit);

	let done = h.recv().await;
	assert_eq!(h.complete(done), CycleStatus::Stale);

	let ranges: Vec<_> = h.pipeline.context().anchors().map(|(a, _)| a.range).collect();
	assert_eq!(ranges, vec![DocumentRange::new(1, 3)]);
}

#[tokio::test]
async fn partial_scope_runs_only_named_providers() {
	let a = provider("a", &[(0..2, "a0")]);
	let b = provider("b", &[(12..14, "b0")]);
	let mut h = Harness::new(vec![shared(&a), shared(&b)]);
	h.cycle().await;

	b.set_lenses(&[(12..14, "b1")]);
	h.pipeline
		.request(InvalidationScope::provider("b"), TriggerReason::Invalidated, Instant::now());
	h.start().unwrap();
	let done = h.recv().await;
	h.complete(done);

	assert_eq!((a.calls(), b.calls()), (1, 2));
	assert_eq!(h.texts(), vec!["a0", "b1"]);
}

#[tokio::test]
async fn failed_provider_keeps_previous_entries() {
	let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
	let flaky = {
		let fail = Arc::clone(&fail);
		FnProvider::new(ProviderDescriptor::new("flaky"), move |_, _| {
			if fail.load(std::sync::atomic::Ordering::Acquire) {
				panic!("flaky provider exploded");
			}
			Ok(vec![(DocumentRange::new(0, 2), LensEntry::new("flaky", "ok"))])
		})
	};
	let other = provider("other", &[(12..14, "other")]);
	let mut h = Harness::new(vec![Arc::new(flaky) as SharedProvider, shared(&other)]);
	h.cycle().await;

	fail.store(true, std::sync::atomic::Ordering::Release);
	let done = {
		h.pipeline
			.request(InvalidationScope::Full, TriggerReason::Invalidated, Instant::now());
		h.start().unwrap();
		h.recv().await
	};
	assert_eq!(done.output.failed, vec![ProviderId::new("flaky")]);
	assert_eq!(done.output.computed.len(), 1);
	h.complete(done);

	let mut texts = h.texts();
	texts.sort();
	assert_eq!(texts, vec!["ok", "other"]);
}

#[tokio::test]
async fn disabled_group_entries_are_removed_by_reset() {
	let a = provider("a", &[(0..2, "a0")]);
	let b = provider("b", &[(12..14, "b0")]);
	let mut h = Harness::new(vec![shared(&a), shared(&b)]);
	h.cycle().await;

	h.settings.disabled_groups.insert("b".into());
	a.set_recompute(false);
	h.pipeline.request_reset(TriggerReason::GroupDisabled, Instant::now());
	h.start().unwrap();
	let done = h.recv().await;
	assert!(matches!(h.complete(done), CycleStatus::Published { anchors: 1, .. }));
	assert_eq!(h.texts(), vec!["a0"]);
	assert_eq!(b.calls(), 1);
}

#[tokio::test]
async fn unregistered_provider_entries_are_removed_without_reset() {
	let a = provider("a", &[(0..2, "a0")]);
	let b = provider("b", &[(12..14, "b0")]);
	let mut h = Harness::new(vec![shared(&a), shared(&b)]);
	h.cycle().await;

	h.providers = ProviderRegistry::new().install(vec![shared(&a)]).unwrap();
	a.set_recompute(false);
	assert!(matches!(h.cycle().await, CycleStatus::Published { anchors: 1, .. }));
	assert_eq!(h.texts(), vec!["a0"]);
}

#[tokio::test]
async fn provider_cancellation_abandons_generation() {
	let cancelling = FnProvider::new(ProviderDescriptor::new("c"), |_, _| Err(ProviderError::Cancelled));
	let mut h = Harness::new(vec![Arc::new(cancelling) as SharedProvider]);
	assert_eq!(h.cycle().await, CycleStatus::Cancelled);
	assert!(h.texts().is_empty());
}

#[tokio::test]
async fn teardown_clears_everything() {
	let a = provider("a", &[(0..2, "a0")]);
	let mut h = Harness::new(vec![shared(&a)]);
	h.cycle().await;

	h.pipeline
		.request(InvalidationScope::Full, TriggerReason::Invalidated, Instant::now());
	h.start().unwrap();
	h.pipeline.teardown(&mut h.view);

	assert_eq!(h.pipeline.phase(), PipelinePhase::Idle);
	assert!(h.pipeline.context().is_empty());
	assert!(h.texts().is_empty());
	let done = h.recv().await;
	assert_eq!(h.complete(done), CycleStatus::Stale);
}

#[tokio::test]
async fn panic_in_should_recompute_fails_only_that_provider() {
	let bad = ordered_provider(ProviderDescriptor::new("bad").before("good"), &[(0..2, "bad")]);
	let good = provider("good", &[(12..14, "good")]);
	bad.set_panic(Some(Hook::ShouldRecompute));
	let mut h = Harness::new(vec![shared(&bad), shared(&good)]);

	h.pipeline
		.request(InvalidationScope::Full, TriggerReason::Invalidated, Instant::now());
	h.start().unwrap();
	let done = h.recv().await;
	assert_eq!(done.output.failed, vec![ProviderId::new("bad")]);
	assert!(!done.output.cancelled);

	assert!(matches!(h.complete(done), CycleStatus::Published { anchors: 1, .. }));
	assert_eq!(h.texts(), vec!["good"]);
	assert_eq!((bad.calls(), good.calls()), (0, 1));
	assert!(!h.pipeline.has_inflight());
}

#[tokio::test]
async fn panicking_availability_check_counts_as_unavailable() {
	let bad = provider("bad", &[(0..2, "bad")]);
	let good = provider("good", &[(12..14, "good")]);
	bad.set_panic(Some(Hook::IsAvailable));
	let mut h = Harness::new(vec![shared(&bad), shared(&good)]);

	assert!(matches!(h.cycle().await, CycleStatus::Published { anchors: 1, .. }));
	assert_eq!(h.texts(), vec!["good"]);
	assert_eq!(bad.calls(), 0);
}

#[tokio::test]
async fn completion_of_an_earlier_pipeline_is_ignored() {
	let a = provider("a", &[(0..2, "old")]);
	let mut h = Harness::new(vec![shared(&a)]);

	h.pipeline = LensPipeline::with_epoch(DOC, 1);
	h.pipeline
		.request(InvalidationScope::Full, TriggerReason::Activated, Instant::now());
	assert_eq!(h.start(), Some(1));
	let old = h.recv().await;

	a.set_lenses(&[(0..2, "new")]);
	h.pipeline = LensPipeline::with_epoch(DOC, 2);
	h.pipeline
		.request(InvalidationScope::Full, TriggerReason::Activated, Instant::now());
	assert_eq!(h.start(), Some(1));
	let new = h.recv().await;
	assert_eq!((old.generation, new.generation), (1, 1));

	assert_eq!(h.complete(old), CycleStatus::Stale);
	assert!(h.pipeline.has_inflight());
	assert_eq!(h.complete(new), CycleStatus::Published {
		generation: 1,
		anchors: 1,
	});
	assert_eq!(h.texts(), vec!["new"]);
}
