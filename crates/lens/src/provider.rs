//! Provider seam.
//!
//! A provider contributes [`LensEntry`] values for one document. The
//! scheduler calls [`LensProvider::precompute`] on the foreground, then
//! [`LensProvider::compute`] on a blocking worker with an immutable snapshot.
//! Clicks are dispatched back on the foreground.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use xeno_primitives::{CharIdx, DocumentId, DocumentRange, DocumentSnapshot};

use crate::descriptor::ProviderDescriptor;
use crate::entry::{LensEntry, RawResult};
use crate::error::ProviderError;
use crate::id::AnchorId;
use crate::worker::CancelFlag;

/// Opaque foreground-computed payload handed to [`LensProvider::compute`].
#[derive(Default)]
pub struct UiData(Option<Box<dyn Any + Send + Sync>>);

impl UiData {
	pub fn none() -> Self {
		Self(None)
	}

	pub fn new<T: Any + Send + Sync>(value: T) -> Self {
		Self(Some(Box::new(value)))
	}

	pub fn is_none(&self) -> bool {
		self.0.is_none()
	}

	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.0.as_deref().and_then(|value| value.downcast_ref())
	}
}

impl fmt::Debug for UiData {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(if self.0.is_some() { "UiData(..)" } else { "UiData(None)" })
	}
}

/// Editor-side view state available to precompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewState {
	pub cursor: CharIdx,
	/// Visible line interval, end exclusive.
	pub visible_lines: (usize, usize),
	pub focused: bool,
}

pub struct PrecomputeContext<'a> {
	pub snapshot: &'a DocumentSnapshot,
	pub view: ViewState,
}

pub struct ComputeContext<'a> {
	pub snapshot: &'a DocumentSnapshot,
	pub cancel: &'a CancelFlag,
}

impl ComputeContext<'_> {
	/// Long-running providers should poll this and return [`ProviderError::Cancelled`].
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}
}

/// Where a clicked lens lives.
pub struct ActionContext {
	pub doc_id: DocumentId,
	pub anchor: AnchorId,
	/// Current tracked range of the anchor.
	pub range: DocumentRange,
}

/// A source of lenses.
///
/// Implementations are shared between the foreground and blocking workers,
/// so every method takes `&self`.
pub trait LensProvider: Send + Sync {
	fn descriptor(&self) -> &ProviderDescriptor;

	/// Whether the provider applies to this document at all.
	fn is_available(&self, _snapshot: &DocumentSnapshot) -> bool {
		true
	}

	/// Foreground step; capture anything `compute` needs from the editor.
	fn precompute(&self, _cx: &PrecomputeContext<'_>) -> UiData {
		UiData::none()
	}

	/// Returning false keeps the previously published entries without recomputing.
	fn should_recompute(&self, _snapshot: &DocumentSnapshot, _ui: &UiData) -> bool {
		true
	}

	fn compute(&self, cx: &ComputeContext<'_>, ui: &UiData) -> Result<Vec<RawResult>, ProviderError>;

	fn handle_click(&self, _cx: &ActionContext, _entry: &LensEntry) {}

	fn handle_extra_action(&self, _cx: &ActionContext, _entry: &LensEntry, _action_id: &str) {}
}

pub type SharedProvider = Arc<dyn LensProvider>;
