//! Document primitives shared by the lens scheduler: identities, text
//! snapshots, half-open ranges and edit mapping.

/// Document identity, mutable documents and immutable snapshots.
pub mod document;
/// Single-replacement edits and position mapping through them.
pub mod edit;
/// Half-open character ranges.
pub mod range;

pub use document::{Document, DocumentId, DocumentSnapshot};
pub use edit::{Bias, TextEdit};
pub use range::{CharIdx, DocumentRange};
pub use ropey::{Rope, RopeSlice};
