//! Per-document published lens state.
//!
//! A [`LensContext`] owns the anchors of one document, keeps them in sync
//! with edits, and republishes them to the [`LensView`] grouped by line and
//! anchor kind.

mod anchors;
#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

pub use anchors::{Anchor, ReplaceStats};
use anchors::AnchorTable;
use xeno_primitives::{DocumentId, DocumentRange, DocumentSnapshot, TextEdit};

use crate::entry::{AnchorKind, LensEntry, RawResult};
use crate::id::{AnchorId, GroupId, ProviderId};
use crate::registry::ProviderSnapshot;
use crate::settings::LensSettings;
use crate::view::{LensGroup, LensView, MoreHandler, PresentedLens, ViewGeneration};

/// Priority and anchor-kind resolution used while grouping.
#[derive(Clone, Copy)]
pub struct Presentation<'a> {
	pub providers: &'a ProviderSnapshot,
	pub settings: &'a LensSettings,
}

impl Presentation<'_> {
	/// Unknown providers sort after every installed one.
	pub fn priority(&self, id: &ProviderId) -> usize {
		self.providers.priority(id.as_str()).unwrap_or(usize::MAX)
	}

	pub fn anchor_kind(&self, id: &ProviderId) -> AnchorKind {
		match self.providers.get(id.as_str()) {
			Some(provider) => {
				let descriptor = provider.descriptor();
				self.settings.anchor_for(descriptor.group_id.as_str(), descriptor.default_anchor)
			}
			None => self.settings.default_anchor,
		}
	}

	fn group_of(&self, id: &ProviderId) -> Option<&GroupId> {
		self.providers.get(id.as_str()).map(|p| &p.descriptor().group_id)
	}
}

pub struct LensContext {
	doc_id: DocumentId,
	anchors: AnchorTable,
	/// Handlers of the current view generation, sorted by group range start.
	more: Vec<(DocumentRange, MoreHandler)>,
	shown: Option<ViewGeneration>,
	next_view_generation: u64,
}

impl LensContext {
	pub fn new(doc_id: DocumentId) -> Self {
		Self {
			doc_id,
			anchors: AnchorTable::default(),
			more: Vec::new(),
			shown: None,
			next_view_generation: 0,
		}
	}

	pub fn doc_id(&self) -> DocumentId {
		self.doc_id
	}

	/// Replaces the anchor set with `results`, computed against `snapshot`.
	///
	/// Invalid ranges are dropped. An anchor whose range and entry are
	/// unchanged keeps its [`AnchorId`].
	pub fn set_results(&mut self, results: Vec<RawResult>, snapshot: &DocumentSnapshot) -> ReplaceStats {
		let stats = self.anchors.replace(results, snapshot.len_chars());
		tracing::debug!(
			doc = self.doc_id.0,
			kept = stats.kept,
			created = stats.created,
			disposed = stats.disposed,
			dropped_invalid = stats.dropped_invalid,
			"lens.context.set_results"
		);
		stats
	}

	/// Shifts anchors through an edit. Returns the number of anchors dropped.
	pub fn on_edit(&mut self, edit: &TextEdit) -> usize {
		let dropped = self.anchors.apply_edit(edit);
		if dropped > 0 {
			tracing::trace!(doc = self.doc_id.0, dropped, "lens.context.anchors_deleted");
		}
		dropped
	}

	/// Republishes every anchor to `view` as a fresh view generation.
	pub fn resubmit(&mut self, view: &mut dyn LensView, presentation: &Presentation<'_>, snapshot: &DocumentSnapshot) {
		let mut lines: BTreeMap<usize, Vec<PresentedLens>> = BTreeMap::new();
		for (anchor, entry) in self.anchors.iter() {
			let line = snapshot.line_of_offset(anchor.range.start);
			let lenses = lines.entry(line).or_default();
			let lens = PresentedLens {
				anchor: anchor.id,
				range: anchor.range,
				entry: entry.clone(),
			};
			match lenses.iter_mut().find(|l| l.entry.provider_id == entry.provider_id) {
				Some(slot) => *slot = lens,
				None => lenses.push(lens),
			}
		}

		view.begin_batch(self.doc_id);
		if let Some(old) = self.shown.take() {
			view.retire(self.doc_id, old);
		}
		self.more.clear();

		if !lines.is_empty() {
			self.next_view_generation += 1;
			let generation = ViewGeneration(self.next_view_generation);
			for (line, lenses) in lines {
				let start = snapshot.line_start(line);
				let end = lenses.iter().map(|l| l.range.end).fold(start, usize::max);
				let range = DocumentRange::new(start, end);

				let mut group = LensGroup::new();
				for lens in lenses {
					group.entry(presentation.anchor_kind(&lens.entry.provider_id)).or_default().push(lens);
				}
				for lenses in group.values_mut() {
					lenses.sort_by_key(|l| presentation.priority(&l.entry.provider_id));
				}

				let handler = view.add_entries(generation, self.doc_id, range, &group);
				self.more.push((range, handler));
			}
			self.shown = Some(generation);
		}
		view.end_batch(self.doc_id);

		tracing::trace!(doc = self.doc_id.0, groups = self.more.len(), "lens.context.resubmitted");
	}

	/// Runs the "more" handler of the last line group starting at or before `offset`.
	pub fn invoke_more(&mut self, offset: usize) -> bool {
		let idx = self.more.partition_point(|(range, _)| range.start <= offset);
		let Some((_, handler)) = idx.checked_sub(1).and_then(|i| self.more.get_mut(i)) else {
			return false;
		};
		handler(offset);
		true
	}

	pub fn has_provider(&self, id: &str) -> bool {
		self.anchors.iter().any(|(_, entry)| entry.provider_id == id)
	}

	/// Whether any published entry belongs to a provider of `group`.
	pub fn has_group(&self, group: &GroupId, presentation: &Presentation<'_>) -> bool {
		self.anchors
			.iter()
			.any(|(_, entry)| presentation.group_of(&entry.provider_id) == Some(group))
	}

	pub fn any_entry(&self, mut pred: impl FnMut(&LensEntry) -> bool) -> bool {
		self.anchors.iter().any(|(_, entry)| pred(entry))
	}

	pub fn anchor(&self, id: AnchorId) -> Option<(&Anchor, &LensEntry)> {
		self.anchors.get(id)
	}

	pub fn anchors(&self) -> impl Iterator<Item = (&Anchor, &LensEntry)> + '_ {
		self.anchors.iter()
	}

	/// Current anchors as raw results, in submission order.
	pub fn results(&self) -> Vec<RawResult> {
		self.anchors.iter().map(|(anchor, entry)| (anchor.range, entry.clone())).collect()
	}

	pub fn len(&self) -> usize {
		self.anchors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.anchors.is_empty()
	}

	pub fn shown(&self) -> Option<ViewGeneration> {
		self.shown
	}

	/// Drops every anchor and retires the published view generation.
	pub fn clear(&mut self, view: &mut dyn LensView) {
		let stats = self.anchors.replace(Vec::new(), 0);
		self.more.clear();
		if let Some(old) = self.shown.take() {
			view.begin_batch(self.doc_id);
			view.retire(self.doc_id, old);
			view.end_batch(self.doc_id);
		}
		tracing::debug!(doc = self.doc_id.0, disposed = stats.disposed, "lens.context.cleared");
	}
}
