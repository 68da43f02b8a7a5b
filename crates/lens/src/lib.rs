//! Lens computation scheduler.
//!
//! Lenses are small inline hints attached to document ranges (reference
//! counts, authorship, test status). This crate decides *when* and *in which
//! order* providers compute them and how results reach the view:
//!
//! * [`ordering`] resolves a deterministic provider priority from relative
//!   constraints.
//! * [`throttle`] skips provider groups that are chronically slow.
//! * [`pipeline`] runs a debounced, cancellable cycle per document on the
//!   blocking pool.
//! * [`context`] anchors results, tracks them through edits and republishes
//!   them grouped by line and anchor kind.
//! * [`host`] ties everything to the editor loop.
//!
//! Provider logic and rendering live outside: see [`LensProvider`] and
//! [`LensView`].

pub mod context;
mod descriptor;
mod entry;
pub mod error;
pub mod host;
mod id;
pub mod ordering;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod settings;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod throttle;
pub mod view;
mod worker;

pub use context::{Anchor, LensContext, Presentation, ReplaceStats};
pub use descriptor::{OrderingConstraint, ProviderDescriptor};
pub use entry::{AnchorKind, ExtraAction, LensEntry, RawResult};
pub use error::{LensError, ProviderError, Result, SettingsError};
pub use host::{DocumentSource, FeatureState, LensHost, TickStats};
pub use id::{AnchorId, GroupId, ProviderId};
pub use pipeline::{CycleStatus, InvalidationScope, LensPipeline, PipelinePhase, TriggerReason};
pub use provider::{ActionContext, ComputeContext, LensProvider, PrecomputeContext, SharedProvider, UiData, ViewState};
pub use registry::{ProviderRegistry, ProviderSnapshot};
pub use settings::{AnchorLimits, LensSettings, ThrottleSettings};
pub use throttle::{ProviderThrottle, ThrottleConfig, ThrottleRecord};
pub use view::{LensGroup, LensView, MoreHandler, PresentedLens, ViewGeneration};
pub use worker::CancelFlag;
