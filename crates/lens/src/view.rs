//! View seam: where grouped lenses are published for rendering.

use std::collections::BTreeMap;

use xeno_primitives::{DocumentId, DocumentRange};

use crate::entry::{AnchorKind, LensEntry};
use crate::id::AnchorId;
use crate::settings::AnchorLimits;

/// Callback stored per line group; invoked with the request offset when the
/// user asks for the lenses hidden by the per-anchor limit.
pub type MoreHandler = Box<dyn FnMut(usize)>;

/// Identity of one publication of a document's lenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewGeneration(pub u64);

/// One lens as the view sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedLens {
	pub anchor: AnchorId,
	pub range: DocumentRange,
	pub entry: LensEntry,
}

/// Lenses of one line, keyed by resolved anchor kind, each kind in priority order.
pub type LensGroup = BTreeMap<AnchorKind, Vec<PresentedLens>>;

pub trait LensView {
	fn set_per_anchor_limits(&mut self, limits: &AnchorLimits);

	/// Opens an atomic update of `doc`.
	fn begin_batch(&mut self, _doc: DocumentId) {}

	/// Publishes the lenses of one line under `generation`.
	fn add_entries(&mut self, generation: ViewGeneration, doc: DocumentId, range: DocumentRange, group: &LensGroup) -> MoreHandler;

	/// Removes everything published for `doc` under `generation`.
	fn retire(&mut self, doc: DocumentId, generation: ViewGeneration);

	/// Closes the update opened by [`LensView::begin_batch`].
	fn end_batch(&mut self, _doc: DocumentId) {}
}
