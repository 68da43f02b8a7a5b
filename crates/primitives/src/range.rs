use std::fmt;

/// A position in the text, measured in characters (not bytes).
pub type CharIdx = usize;

/// Half-open `[start, end)` character interval.
///
/// A range is only meaningful against the document version it was produced
/// from. Consumers that hold ranges across edits must map them through each
/// [`crate::TextEdit`] or re-validate them with [`DocumentRange::is_valid_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DocumentRange {
	/// First character covered by the range.
	pub start: CharIdx,
	/// One past the last character covered by the range.
	pub end: CharIdx,
}

impl DocumentRange {
	/// Creates a range from `start` to `end`.
	///
	/// No ordering is enforced here; providers may hand back inverted ranges
	/// and those are rejected by [`Self::is_valid_for`].
	pub const fn new(start: CharIdx, end: CharIdx) -> Self {
		Self { start, end }
	}

	/// Creates an empty range at `pos`.
	pub const fn point(pos: CharIdx) -> Self {
		Self::new(pos, pos)
	}

	/// Returns the number of characters covered.
	#[inline]
	pub const fn len(&self) -> usize {
		self.end.saturating_sub(self.start)
	}

	/// Returns true if the range covers no characters.
	#[inline]
	pub const fn is_empty(&self) -> bool {
		self.end <= self.start
	}

	/// Returns true if `pos` lies inside the range (exclusive of `end`).
	#[inline]
	pub const fn contains(&self, pos: CharIdx) -> bool {
		pos >= self.start && pos < self.end
	}

	/// Returns true if the range is well-formed and fits a text of `len_chars`.
	#[inline]
	pub const fn is_valid_for(&self, len_chars: usize) -> bool {
		self.start <= self.end && self.end <= len_chars
	}

	/// Smallest range covering both `self` and `other`.
	pub fn union(&self, other: &Self) -> Self {
		Self::new(self.start.min(other.start), self.end.max(other.end))
	}
}

impl From<std::ops::Range<CharIdx>> for DocumentRange {
	fn from(range: std::ops::Range<CharIdx>) -> Self {
		Self::new(range.start, range.end)
	}
}

impl fmt::Display for DocumentRange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}..{}", self.start, self.end)
	}
}
