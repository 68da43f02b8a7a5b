use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use xeno_primitives::{DocumentRange, TextEdit};

use crate::entry::{LensEntry, RawResult};
use crate::id::AnchorId;

/// A published result bound to an edit-tracking range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
	pub id: AnchorId,
	pub range: DocumentRange,
}

/// Outcome counters of one [`AnchorTable::replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaceStats {
	pub kept: usize,
	pub created: usize,
	pub disposed: usize,
	pub dropped_invalid: usize,
}

/// Anchors of one document in submission order, with their entries in a side table.
#[derive(Debug, Default)]
pub(crate) struct AnchorTable {
	next_id: u64,
	anchors: Vec<Anchor>,
	entries: FxHashMap<AnchorId, LensEntry>,
}

impl AnchorTable {
	/// Replaces every anchor with `results`, reusing ids of identical `(range, entry)` pairs.
	pub(crate) fn replace(&mut self, results: Vec<RawResult>, doc_len: usize) -> ReplaceStats {
		let mut stats = ReplaceStats::default();

		let mut reusable: FxHashMap<(DocumentRange, LensEntry), VecDeque<AnchorId>> = FxHashMap::default();
		let mut old_entries = std::mem::take(&mut self.entries);
		for anchor in std::mem::take(&mut self.anchors) {
			if let Some(entry) = old_entries.remove(&anchor.id) {
				reusable.entry((anchor.range, entry)).or_default().push_back(anchor.id);
			}
		}

		self.anchors.reserve(results.len());
		for (range, entry) in results {
			if !range.is_valid_for(doc_len) {
				tracing::trace!(%range, doc_len, provider = %entry.provider_id, "lens.anchor.invalid_range");
				stats.dropped_invalid += 1;
				continue;
			}

			let key = (range, entry);
			let id = match reusable.get_mut(&key).and_then(VecDeque::pop_front) {
				Some(id) => {
					stats.kept += 1;
					id
				}
				None => {
					stats.created += 1;
					self.allocate()
				}
			};
			self.anchors.push(Anchor { id, range });
			self.entries.insert(id, key.1);
		}

		stats.disposed = reusable.values().map(VecDeque::len).sum();
		stats
	}

	/// Maps every anchor through `edit`, dropping anchors whose span was deleted.
	pub(crate) fn apply_edit(&mut self, edit: &TextEdit) -> usize {
		let entries = &mut self.entries;
		let before = self.anchors.len();
		self.anchors.retain_mut(|anchor| match edit.map_range(anchor.range) {
			Some(range) => {
				anchor.range = range;
				true
			}
			None => {
				entries.remove(&anchor.id);
				false
			}
		});
		before - self.anchors.len()
	}

	fn allocate(&mut self) -> AnchorId {
		self.next_id += 1;
		AnchorId(self.next_id)
	}

	pub(crate) fn iter(&self) -> impl Iterator<Item = (&Anchor, &LensEntry)> + '_ {
		self.anchors
			.iter()
			.filter_map(|anchor| self.entries.get(&anchor.id).map(|entry| (anchor, entry)))
	}

	pub(crate) fn get(&self, id: AnchorId) -> Option<(&Anchor, &LensEntry)> {
		let entry = self.entries.get(&id)?;
		let anchor = self.anchors.iter().find(|a| a.id == id)?;
		Some((anchor, entry))
	}

	pub(crate) fn len(&self) -> usize {
		self.anchors.len()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.anchors.is_empty()
	}
}
