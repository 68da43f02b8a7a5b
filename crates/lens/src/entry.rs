use std::sync::Arc;

use serde::{Deserialize, Serialize};
use xeno_primitives::DocumentRange;

use crate::id::ProviderId;

/// Position category a lens is rendered in.
///
/// [`AnchorKind::Default`] is a placeholder resolved through settings: the
/// per-group override wins, then the provider's own default, then the global
/// default anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnchorKind {
	/// Own line above the anchored line.
	Top,
	/// After the end of the anchored line.
	Right,
	/// Next to the scrollbar.
	NearScroll,
	/// In the empty space to the right of the text block.
	EmptySpace,
	/// Resolved through settings.
	#[default]
	Default,
}

impl AnchorKind {
	/// Every kind a lens can actually be rendered in.
	pub const CONCRETE: [AnchorKind; 4] = [Self::Top, Self::Right, Self::NearScroll, Self::EmptySpace];

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Top => "top",
			Self::Right => "right",
			Self::NearScroll => "near-scroll",
			Self::EmptySpace => "empty-space",
			Self::Default => "default",
		}
	}

	pub const fn is_concrete(self) -> bool {
		!matches!(self, Self::Default)
	}
}

/// Secondary action offered next to a lens (e.g. in its context menu).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtraAction {
	pub id: String,
	pub title: String,
}

/// One hint produced by a provider.
///
/// The scheduler only looks at `provider_id`; everything else is carried to
/// the view and back to the provider on clicks. Entries compare by value so
/// an unchanged result keeps its anchor across cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LensEntry {
	pub provider_id: ProviderId,
	pub text: String,
	pub tooltip: Option<String>,
	/// Provider-private data handed back on click.
	pub payload: Option<Arc<str>>,
	pub extra_actions: Vec<ExtraAction>,
}

impl LensEntry {
	pub fn new(provider_id: impl Into<ProviderId>, text: impl Into<String>) -> Self {
		Self {
			provider_id: provider_id.into(),
			text: text.into(),
			tooltip: None,
			payload: None,
			extra_actions: Vec::new(),
		}
	}

	pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
		self.tooltip = Some(tooltip.into());
		self
	}

	pub fn with_payload(mut self, payload: impl Into<Arc<str>>) -> Self {
		self.payload = Some(payload.into());
		self
	}

	pub fn with_action(mut self, id: impl Into<String>, title: impl Into<String>) -> Self {
		self.extra_actions.push(ExtraAction {
			id: id.into(),
			title: title.into(),
		});
		self
	}
}

/// A provider result bound to the document version it was computed against.
pub type RawResult = (DocumentRange, LensEntry);
