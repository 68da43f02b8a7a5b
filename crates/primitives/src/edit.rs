use crate::range::{CharIdx, DocumentRange};

/// Bias determines how positions at an edit boundary are mapped.
///
/// When an insertion lands exactly on a position, bias decides whether the
/// position stays before the inserted text or moves past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
	/// Position stays before insertions at the same location.
	Left,
	/// Position moves after insertions at the same location.
	Right,
}

/// A single replacement: `deleted` characters at `start` replaced by
/// `inserted` characters.
///
/// Pure insertions have `deleted == 0`, pure deletions have `inserted == 0`.
/// Only lengths are carried; anchor tracking never needs the inserted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextEdit {
	/// Character offset where the edit begins (pre-edit coordinates).
	pub start: CharIdx,
	/// Number of characters removed at `start`.
	pub deleted: usize,
	/// Number of characters inserted at `start`.
	pub inserted: usize,
}

impl TextEdit {
	/// Insertion of `len` characters at `at`.
	pub const fn insert(at: CharIdx, len: usize) -> Self {
		Self {
			start: at,
			deleted: 0,
			inserted: len,
		}
	}

	/// Deletion of `range`.
	pub const fn delete(range: DocumentRange) -> Self {
		Self {
			start: range.start,
			deleted: range.len(),
			inserted: 0,
		}
	}

	/// Replacement of `range` by `inserted` characters.
	pub const fn replace(range: DocumentRange, inserted: usize) -> Self {
		Self {
			start: range.start,
			deleted: range.len(),
			inserted,
		}
	}

	/// End of the removed span in pre-edit coordinates.
	#[inline]
	pub const fn old_end(&self) -> CharIdx {
		self.start + self.deleted
	}

	/// End of the inserted span in post-edit coordinates.
	#[inline]
	pub const fn new_end(&self) -> CharIdx {
		self.start + self.inserted
	}

	/// Returns true if the edit neither removes nor inserts anything.
	#[inline]
	pub const fn is_noop(&self) -> bool {
		self.deleted == 0 && self.inserted == 0
	}

	/// Maps a pre-edit position to post-edit coordinates.
	///
	/// Positions inside the removed span collapse to the edit start, or to the
	/// end of the inserted text for [`Bias::Right`].
	pub fn map_pos(&self, pos: CharIdx, bias: Bias) -> CharIdx {
		if pos < self.start {
			return pos;
		}
		if pos >= self.old_end() && !(pos == self.start && self.deleted == 0) {
			return pos - self.deleted + self.inserted;
		}
		match bias {
			Bias::Left => self.start,
			Bias::Right => self.new_end(),
		}
	}

	/// Maps a range through the edit, returning `None` when the edit wiped it.
	///
	/// A non-empty range dies when its whole span is removed. An empty range
	/// dies only when it sits strictly inside the removed span; a point on the
	/// boundary survives. Surviving ranges keep their start after insertions
	/// at the start and do not grow on insertions at their end.
	pub fn map_range(&self, range: DocumentRange) -> Option<DocumentRange> {
		if self.deleted > 0 {
			let old_end = self.old_end();
			let swallowed = if range.is_empty() {
				range.start > self.start && range.start < old_end
			} else {
				self.start <= range.start && range.end <= old_end
			};
			if swallowed {
				return None;
			}
		}

		if range.is_empty() {
			return Some(DocumentRange::point(self.map_pos(range.start, Bias::Left)));
		}

		let start = self.map_pos(range.start, Bias::Right);
		let end = self.map_pos(range.end, Bias::Left).max(start);
		Some(DocumentRange::new(start, end))
	}
}
