//! Error types for the lens scheduler.

use std::path::PathBuf;

use thiserror::Error;
use xeno_primitives::DocumentId;

use crate::id::{AnchorId, ProviderId};

/// Failure of a single provider invocation.
///
/// Contained by the pipeline: the failing provider contributes nothing to the
/// cycle, the others still run.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
	/// The provider observed cancellation and gave up.
	#[error("computation cancelled")]
	Cancelled,
	/// The provider could not produce results.
	#[error("{0}")]
	Failed(String),
	/// The provider panicked; the payload message is kept for diagnostics.
	#[error("provider panicked: {0}")]
	Panicked(String),
}

impl ProviderError {
	pub fn failed(message: impl Into<String>) -> Self {
		Self::Failed(message.into())
	}
}

/// Errors loading or validating [`crate::LensSettings`].
#[derive(Debug, Error)]
pub enum SettingsError {
	/// Error reading a settings file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// Error parsing TOML syntax or shape.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),

	/// Error serializing settings back to TOML.
	#[error("TOML serialize error: {0}")]
	Serialize(#[from] toml::ser::Error),

	/// The global default anchor must be a concrete kind.
	#[error("default anchor must be concrete, got '{0}'")]
	UnresolvedDefaultAnchor(&'static str),

	/// Recovery threshold above the significant threshold would never track anything.
	#[error("throttle recovery ({recovery_ms}ms) must not exceed significant time ({significant_ms}ms)")]
	ThrottleThresholds {
		/// Configured recovery threshold.
		recovery_ms: u64,
		/// Configured significant threshold.
		significant_ms: u64,
	},
}

/// Errors returned to callers of [`crate::LensHost`].
#[derive(Debug, Error)]
pub enum LensError {
	/// The document has no live pipeline (hidden, closed, or feature disabled).
	#[error("document {0:?} is not tracked")]
	UnknownDocument(DocumentId),

	/// The anchor is not published in the document.
	#[error("anchor {anchor:?} is not published in document {doc:?}")]
	UnknownAnchor {
		/// Document that was searched.
		doc: DocumentId,
		/// Missing anchor.
		anchor: AnchorId,
	},

	/// No installed provider has this id.
	#[error("unknown provider: {0}")]
	UnknownProvider(ProviderId),

	/// Two providers in one install share an id.
	#[error("duplicate provider id: {0}")]
	DuplicateProvider(ProviderId),

	/// Settings could not be loaded or validated.
	#[error(transparent)]
	Settings(#[from] SettingsError),
}

/// Result type for lens host operations.
pub type Result<T> = std::result::Result<T, LensError>;
