use ropey::Rope;

use crate::edit::TextEdit;
use crate::range::{CharIdx, DocumentRange};

/// Unique identifier for an open document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

/// Mutable text document with a monotonically increasing version.
///
/// Every mutation bumps the version and returns the [`TextEdit`] that
/// describes it, so observers can map positions they hold.
#[derive(Debug, Clone)]
pub struct Document {
	id: DocumentId,
	text: Rope,
	version: u64,
}

impl Document {
	/// Creates a document at version 0.
	pub fn new(id: DocumentId, text: &str) -> Self {
		Self {
			id,
			text: Rope::from_str(text),
			version: 0,
		}
	}

	pub fn id(&self) -> DocumentId {
		self.id
	}

	pub fn version(&self) -> u64 {
		self.version
	}

	pub fn text(&self) -> &Rope {
		&self.text
	}

	pub fn len_chars(&self) -> usize {
		self.text.len_chars()
	}

	/// Replaces `range` with `text`.
	///
	/// The range is clamped to the document so a stale caller cannot panic the
	/// rope; the returned edit reflects the clamped range.
	pub fn replace(&mut self, range: DocumentRange, text: &str) -> TextEdit {
		let len = self.text.len_chars();
		let start = range.start.min(len);
		let end = range.end.clamp(start, len);
		if end > start {
			self.text.remove(start..end);
		}
		if !text.is_empty() {
			self.text.insert(start, text);
		}
		self.version += 1;
		TextEdit::replace(DocumentRange::new(start, end), text.chars().count())
	}

	/// Inserts `text` at `at`.
	pub fn insert(&mut self, at: CharIdx, text: &str) -> TextEdit {
		self.replace(DocumentRange::point(at), text)
	}

	/// Removes `range`.
	pub fn delete(&mut self, range: DocumentRange) -> TextEdit {
		self.replace(range, "")
	}

	/// Cheap immutable view of the current version.
	pub fn snapshot(&self) -> DocumentSnapshot {
		DocumentSnapshot::new(self.id, self.version, self.text.clone())
	}
}

/// Immutable document text at one version.
///
/// Cloning shares the underlying rope, so snapshots can be handed to
/// background work freely.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
	id: DocumentId,
	version: u64,
	text: Rope,
}

impl DocumentSnapshot {
	pub fn new(id: DocumentId, version: u64, text: Rope) -> Self {
		Self { id, version, text }
	}

	pub fn id(&self) -> DocumentId {
		self.id
	}

	pub fn version(&self) -> u64 {
		self.version
	}

	pub fn text(&self) -> &Rope {
		&self.text
	}

	pub fn len_chars(&self) -> usize {
		self.text.len_chars()
	}

	/// Number of lines, including the empty line after a trailing newline.
	pub fn line_count(&self) -> usize {
		self.text.len_lines()
	}

	/// Zero-based line containing `offset`; offsets past the end map to the last line.
	pub fn line_of_offset(&self, offset: CharIdx) -> usize {
		self.text.char_to_line(offset.min(self.text.len_chars()))
	}

	/// Offset of the first character of `line`; lines past the end map to the text end.
	pub fn line_start(&self, line: usize) -> CharIdx {
		self.text.line_to_char(line.min(self.text.len_lines()))
	}

	/// Offset one past the last character of `line`, excluding its line break.
	pub fn line_end(&self, line: usize) -> CharIdx {
		let next = self.line_start(line.saturating_add(1));
		let mut end = next;
		while end > self.line_start(line) {
			match self.text.get_char(end - 1) {
				Some('\n' | '\r') => end -= 1,
				_ => break,
			}
		}
		end
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn replace_bumps_version_and_reports_edit() {
		let mut doc = Document::new(DocumentId(1), "hello world");
		let edit = doc.replace(DocumentRange::new(0, 5), "howdy!");
		assert_eq!(doc.version(), 1);
		assert_eq!(doc.text().to_string(), "howdy! world");
		assert_eq!(edit, TextEdit::replace(DocumentRange::new(0, 5), 6));
	}

	#[test]
	fn out_of_bounds_edit_is_clamped() {
		let mut doc = Document::new(DocumentId(1), "abc");
		let edit = doc.delete(DocumentRange::new(2, 40));
		assert_eq!(doc.text().to_string(), "ab");
		assert_eq!(edit.deleted, 1);

		let edit = doc.insert(99, "z");
		assert_eq!(doc.text().to_string(), "abz");
		assert_eq!(edit.start, 2);
	}

	#[test]
	fn snapshot_is_isolated_from_later_edits() {
		let mut doc = Document::new(DocumentId(7), "one\ntwo\n");
		let snap = doc.snapshot();
		doc.insert(0, "zero\n");
		assert_eq!(snap.version(), 0);
		assert_eq!(snap.line_count(), 3);
		assert_eq!(doc.snapshot().line_count(), 4);
	}

	#[test]
	fn line_offset_conversion() {
		let snap = Document::new(DocumentId(1), "ab\ncde\r\nf").snapshot();
		assert_eq!(snap.line_of_offset(0), 0);
		assert_eq!(snap.line_of_offset(3), 1);
		assert_eq!(snap.line_of_offset(100), 2);
		assert_eq!(snap.line_start(1), 3);
		assert_eq!(snap.line_end(1), 6);
		assert_eq!(snap.line_end(2), 9);
		assert_eq!(snap.line_start(42), 9);
	}
}
