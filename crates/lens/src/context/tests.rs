use std::sync::Arc;

use pretty_assertions::assert_eq;
use xeno_primitives::{Document, DocumentId, DocumentRange, DocumentSnapshot, TextEdit};

use super::*;
use crate::descriptor::ProviderDescriptor;
use crate::provider::SharedProvider;
use crate::registry::ProviderRegistry;
use crate::testing::{RecordingView, StaticProvider};

const DOC: DocumentId = DocumentId(1);
const TEXT: &str = "fn alpha() {}\nfn beta() {}\n\nfn gamma() {}\n";

fn snapshot() -> DocumentSnapshot {
	Document::new(DOC, TEXT).snapshot()
}

fn entry(provider: &str, text: &str) -> LensEntry {
	LensEntry::new(provider, text)
}

fn result(range: std::ops::Range<usize>, provider: &str, text: &str) -> RawResult {
	(DocumentRange::from(range), entry(provider, text))
}

fn providers(descriptors: Vec<ProviderDescriptor>) -> Arc<ProviderSnapshot> {
	let registry = ProviderRegistry::new();
	let providers: Vec<SharedProvider> = descriptors
		.into_iter()
		.map(|d| Arc::new(StaticProvider::new(d)) as SharedProvider)
		.collect();
	registry.install(providers).unwrap()
}

fn ids(cx: &LensContext) -> Vec<AnchorId> {
	cx.anchors().map(|(a, _)| a.id).collect()
}

#[test]
fn set_results_drops_invalid_ranges() {
	let snap = snapshot();
	let mut cx = LensContext::new(DOC);
	let len = snap.len_chars();
	let stats = cx.set_results(
		vec![
			result(0..2, "p", "ok"),
			result(5..3, "p", "reversed"),
			result(len - 1..len + 4, "p", "past end"),
			result(len..len, "p", "at end"),
		],
		&snap,
	);

	assert_eq!(stats.dropped_invalid, 2);
	assert_eq!(stats.created, 2);
	let texts: Vec<_> = cx.anchors().map(|(_, e)| e.text.as_str()).collect();
	assert_eq!(texts, vec!["ok", "at end"]);
}

#[test]
fn identical_results_keep_anchor_ids() {
	let snap = snapshot();
	let mut cx = LensContext::new(DOC);
	cx.set_results(vec![result(0..2, "p", "a"), result(14..16, "p", "b")], &snap);
	let first = ids(&cx);

	let stats = cx.set_results(vec![result(0..2, "p", "a"), result(14..16, "p", "b")], &snap);
	assert_eq!(ids(&cx), first);
	assert_eq!(stats, ReplaceStats {
		kept: 2,
		..ReplaceStats::default()
	});
}

#[test]
fn changed_results_dispose_and_allocate() {
	let snap = snapshot();
	let mut cx = LensContext::new(DOC);
	cx.set_results(vec![result(0..2, "p", "a"), result(14..16, "p", "b")], &snap);
	let first = ids(&cx);

	let stats = cx.set_results(vec![result(0..2, "p", "a"), result(14..16, "p", "changed")], &snap);
	let second = ids(&cx);
	assert_eq!(second[0], first[0]);
	assert_ne!(second[1], first[1]);
	assert!(second[1] > first[1], "ids are never reused");
	assert_eq!((stats.kept, stats.created, stats.disposed), (1, 1, 1));
}

#[test]
fn duplicate_results_each_get_an_anchor() {
	let snap = snapshot();
	let mut cx = LensContext::new(DOC);
	cx.set_results(vec![result(0..2, "p", "a"), result(0..2, "p", "a")], &snap);
	let first = ids(&cx);
	assert_eq!(first.len(), 2);

	cx.set_results(vec![result(0..2, "p", "a"), result(0..2, "p", "a")], &snap);
	assert_eq!(ids(&cx), first);
}

#[test]
fn edits_shift_and_drop_anchors() {
	let snap = snapshot();
	let mut cx = LensContext::new(DOC);
	cx.set_results(vec![result(0..2, "p", "head"), result(17..21, "p", "beta")], &snap);

	assert_eq!(cx.on_edit(&TextEdit::insert(0, 3)), 0);
	let ranges: Vec<_> = cx.anchors().map(|(a, _)| a.range).collect();
	assert_eq!(ranges, vec![DocumentRange::new(3, 5), DocumentRange::new(20, 24)]);

	assert_eq!(cx.on_edit(&TextEdit::delete(DocumentRange::new(19, 25))), 1);
	assert_eq!(cx.results(), vec![result(3..5, "p", "head")]);
}

#[test]
fn resubmit_groups_by_line_kind_and_priority() {
	let snap = snapshot();
	let providers = providers(vec![
		ProviderDescriptor::new("refs").with_anchor(AnchorKind::Top),
		ProviderDescriptor::new("impls").with_anchor(AnchorKind::Top).first(),
		ProviderDescriptor::new("author").with_anchor(AnchorKind::Right),
	]);
	let settings = LensSettings::default();
	let presentation = Presentation {
		providers: &providers,
		settings: &settings,
	};

	let mut cx = LensContext::new(DOC);
	cx.set_results(
		vec![
			result(3..8, "refs", "3 refs"),
			result(0..13, "author", "alice"),
			result(3..8, "impls", "1 impl"),
			result(17..21, "refs", "stale"),
			result(17..21, "refs", "0 refs"),
		],
		&snap,
	);

	let mut view = RecordingView::new();
	cx.resubmit(&mut view, &presentation, &snap);

	let shown = view.shown(DOC);
	assert_eq!(shown.len(), 2);

	let line0 = &shown[0];
	assert_eq!(line0.range, DocumentRange::new(0, 13));
	let top: Vec<_> = line0.group[&AnchorKind::Top].iter().map(|l| l.entry.text.as_str()).collect();
	assert_eq!(top, vec!["1 impl", "3 refs"]);
	assert_eq!(line0.group[&AnchorKind::Right][0].entry.text, "alice");

	let line1 = &shown[1];
	assert_eq!(line1.range, DocumentRange::new(14, 21));
	let texts: Vec<_> = line1.group.values().flatten().map(|l| l.entry.text.as_str()).collect();
	assert_eq!(texts, vec!["0 refs"]);
	assert_eq!(view.with_log(|log| log.open_batches), 0);
}

#[test]
fn resubmit_resolves_anchor_kind_through_settings() {
	let snap = snapshot();
	let providers = providers(vec![
		ProviderDescriptor::new("refs").with_group("nav"),
		ProviderDescriptor::new("author"),
	]);
	let mut settings = LensSettings::default();
	settings.default_anchor = AnchorKind::EmptySpace;
	settings.group_anchors.insert("nav".into(), AnchorKind::NearScroll);
	let presentation = Presentation {
		providers: &providers,
		settings: &settings,
	};

	let mut cx = LensContext::new(DOC);
	cx.set_results(
		vec![result(0..2, "refs", "r"), result(0..2, "author", "a"), result(0..2, "ghost", "g")],
		&snap,
	);
	let mut view = RecordingView::new();
	cx.resubmit(&mut view, &presentation, &snap);

	let group = &view.shown(DOC)[0].group;
	let kinds: Vec<_> = group.keys().copied().collect();
	assert_eq!(kinds, vec![AnchorKind::NearScroll, AnchorKind::EmptySpace]);
	let empty_space: Vec<_> = group[&AnchorKind::EmptySpace].iter().map(|l| l.entry.text.as_str()).collect();
	assert_eq!(empty_space, vec!["a", "g"]);
}

#[test]
fn resubmit_retires_previous_generation() {
	let snap = snapshot();
	let providers = providers(vec![ProviderDescriptor::new("p")]);
	let settings = LensSettings::default();
	let presentation = Presentation {
		providers: &providers,
		settings: &settings,
	};
	let mut cx = LensContext::new(DOC);
	let mut view = RecordingView::new();

	cx.set_results(vec![result(0..2, "p", "one")], &snap);
	cx.resubmit(&mut view, &presentation, &snap);
	let first = cx.shown().unwrap();

	cx.set_results(vec![result(0..2, "p", "two")], &snap);
	cx.resubmit(&mut view, &presentation, &snap);
	assert_ne!(cx.shown(), Some(first));
	assert_eq!(view.texts(DOC), vec!["two"]);
	assert_eq!(view.with_log(|log| log.retired.clone()), vec![(DOC, first)]);

	cx.set_results(Vec::new(), &snap);
	cx.resubmit(&mut view, &presentation, &snap);
	assert_eq!(cx.shown(), None);
	assert!(view.texts(DOC).is_empty());
}

#[test]
fn invoke_more_targets_last_group_at_or_before_offset() {
	let snap = snapshot();
	let providers = providers(vec![ProviderDescriptor::new("p")]);
	let settings = LensSettings::default();
	let presentation = Presentation {
		providers: &providers,
		settings: &settings,
	};
	let mut cx = LensContext::new(DOC);
	let mut view = RecordingView::new();

	assert!(!cx.invoke_more(0), "no groups yet");

	cx.set_results(vec![result(3..5, "p", "a"), result(17..21, "p", "b")], &snap);
	cx.resubmit(&mut view, &presentation, &snap);

	assert!(cx.invoke_more(0));
	assert!(cx.invoke_more(13));
	assert!(cx.invoke_more(14));
	assert!(cx.invoke_more(100));
	let starts: Vec<_> = view.more_calls().iter().map(|(_, range, offset)| (range.start, *offset)).collect();
	assert_eq!(starts, vec![(0, 0), (0, 13), (14, 14), (14, 100)]);
}

#[test]
fn invoke_more_before_first_group_is_a_miss() {
	let snap = snapshot();
	let providers = providers(vec![ProviderDescriptor::new("p")]);
	let settings = LensSettings::default();
	let presentation = Presentation {
		providers: &providers,
		settings: &settings,
	};
	let mut cx = LensContext::new(DOC);
	let mut view = RecordingView::new();
	cx.set_results(vec![result(17..21, "p", "b")], &snap);
	cx.resubmit(&mut view, &presentation, &snap);

	assert!(!cx.invoke_more(5));
	assert!(view.more_calls().is_empty());
}

#[test]
fn queries_and_clear() {
	let snap = snapshot();
	let providers = providers(vec![ProviderDescriptor::new("p").with_group("g")]);
	let settings = LensSettings::default();
	let presentation = Presentation {
		providers: &providers,
		settings: &settings,
	};
	let mut cx = LensContext::new(DOC);
	let mut view = RecordingView::new();
	cx.set_results(vec![result(0..2, "p", "a")], &snap);
	cx.resubmit(&mut view, &presentation, &snap);

	assert!(cx.has_provider("p"));
	assert!(!cx.has_provider("q"));
	assert!(cx.has_group(&GroupId::new("g"), &presentation));
	let id = ids(&cx)[0];
	assert_eq!(cx.anchor(id).map(|(_, e)| e.text.as_str()), Some("a"));

	cx.clear(&mut view);
	assert!(cx.is_empty());
	assert!(cx.anchor(id).is_none());
	assert!(view.texts(DOC).is_empty());
	assert!(!cx.invoke_more(0));
}
