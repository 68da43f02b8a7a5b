use crate::entry::AnchorKind;
use crate::id::{GroupId, ProviderId};

/// Relative placement of a provider with respect to others.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderingConstraint {
	/// Order this provider before the given one.
	Before(ProviderId),
	/// Order this provider after the given one.
	After(ProviderId),
	/// Pull this provider towards the front.
	First,
	/// Push this provider towards the back.
	Last,
}

/// Identity and placement metadata of a lens provider.
///
/// Descriptors are immutable once installed. A hot reload replaces the whole
/// provider set instead of editing a descriptor in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
	pub id: ProviderId,
	pub group_id: GroupId,
	pub name: String,
	pub default_anchor: AnchorKind,
	pub relative_orderings: Vec<OrderingConstraint>,
}

impl ProviderDescriptor {
	/// Descriptor whose group and display name equal its id.
	pub fn new(id: impl Into<ProviderId>) -> Self {
		let id = id.into();
		Self {
			group_id: GroupId::new(id.as_str()),
			name: id.to_string(),
			id,
			default_anchor: AnchorKind::Default,
			relative_orderings: Vec::new(),
		}
	}

	pub fn with_group(mut self, group: impl Into<GroupId>) -> Self {
		self.group_id = group.into();
		self
	}

	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = name.into();
		self
	}

	pub fn with_anchor(mut self, anchor: AnchorKind) -> Self {
		self.default_anchor = anchor;
		self
	}

	pub fn before(mut self, id: impl Into<ProviderId>) -> Self {
		self.relative_orderings.push(OrderingConstraint::Before(id.into()));
		self
	}

	pub fn after(mut self, id: impl Into<ProviderId>) -> Self {
		self.relative_orderings.push(OrderingConstraint::After(id.into()));
		self
	}

	pub fn first(mut self) -> Self {
		self.relative_orderings.push(OrderingConstraint::First);
		self
	}

	pub fn last(mut self) -> Self {
		self.relative_orderings.push(OrderingConstraint::Last);
		self
	}
}
