use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

macro_rules! string_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
		pub struct $name(Arc<str>);

		impl $name {
			pub fn new(id: impl Into<Arc<str>>) -> Self {
				Self(id.into())
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}

		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<&str> for $name {
			fn from(id: &str) -> Self {
				Self::new(id)
			}
		}

		impl From<String> for $name {
			fn from(id: String) -> Self {
				Self::new(id)
			}
		}

		impl PartialEq<str> for $name {
			fn eq(&self, other: &str) -> bool {
				&*self.0 == other
			}
		}

		impl PartialEq<&str> for $name {
			fn eq(&self, other: &&str) -> bool {
				&*self.0 == *other
			}
		}
	};
}

string_id! {
	/// Unique identifier of a lens provider.
	ProviderId
}

string_id! {
	/// Identifier shared by providers that are enabled, disabled and throttled together.
	GroupId
}

/// Identity of one published anchor within its document.
///
/// Ids are never reused inside a document, so an id held by the view stays
/// unambiguous after the anchor is disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(pub(crate) u64);

impl AnchorId {
	pub const fn get(self) -> u64 {
		self.0
	}
}
