//! Copy-on-write provider registry.
//!
//! Readers load an `Arc<ProviderSnapshot>` and keep it for as long as they
//! need a consistent view; installs swap in a whole new snapshot.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::descriptor::ProviderDescriptor;
use crate::error::{LensError, Result};
use crate::id::ProviderId;
use crate::ordering;
use crate::provider::SharedProvider;

/// Installed providers in resolved priority order.
#[derive(Default)]
pub struct ProviderSnapshot {
	version: u64,
	ordered: Vec<SharedProvider>,
	by_id: FxHashMap<ProviderId, usize>,
}

impl ProviderSnapshot {
	/// Incremented by every install, starting at 0 for the empty registry.
	pub fn version(&self) -> u64 {
		self.version
	}

	/// Providers, highest priority first.
	pub fn ordered(&self) -> &[SharedProvider] {
		&self.ordered
	}

	pub fn get(&self, id: &str) -> Option<&SharedProvider> {
		self.by_id.get(id).map(|&idx| &self.ordered[idx])
	}

	/// Position in the resolved order; lower sorts first.
	pub fn priority(&self, id: &str) -> Option<usize> {
		self.by_id.get(id).copied()
	}

	pub fn contains(&self, id: &str) -> bool {
		self.by_id.contains_key(id)
	}

	pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> + '_ {
		self.ordered.iter().map(|p| p.descriptor())
	}

	pub fn len(&self) -> usize {
		self.ordered.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ordered.is_empty()
	}
}

impl fmt::Debug for ProviderSnapshot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProviderSnapshot")
			.field("version", &self.version)
			.field("order", &self.descriptors().map(|d| d.id.as_str()).collect::<Vec<_>>())
			.finish()
	}
}

pub struct ProviderRegistry {
	snap: ArcSwap<ProviderSnapshot>,
}

impl Default for ProviderRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl ProviderRegistry {
	pub fn new() -> Self {
		Self {
			snap: ArcSwap::from_pointee(ProviderSnapshot::default()),
		}
	}

	pub fn snapshot(&self) -> Arc<ProviderSnapshot> {
		self.snap.load_full()
	}

	/// Replaces the provider set and re-derives the order.
	///
	/// # Errors
	///
	/// Returns [`LensError::DuplicateProvider`] if two providers share an id;
	/// the current snapshot stays installed.
	pub fn install(&self, providers: Vec<SharedProvider>) -> Result<Arc<ProviderSnapshot>> {
		let mut seen = FxHashSet::default();
		for provider in &providers {
			let id = &provider.descriptor().id;
			if !seen.insert(id.clone()) {
				return Err(LensError::DuplicateProvider(id.clone()));
			}
		}

		let descriptors: Vec<ProviderDescriptor> = providers.iter().map(|p| p.descriptor().clone()).collect();
		let order = ordering::resolve(&descriptors);

		let mut by_registration: FxHashMap<ProviderId, SharedProvider> =
			providers.into_iter().map(|p| (p.descriptor().id.clone(), p)).collect();
		let mut ordered = Vec::with_capacity(order.len());
		let mut by_id = FxHashMap::default();
		for id in order {
			if let Some(provider) = by_registration.remove(&id) {
				by_id.insert(id, ordered.len());
				ordered.push(provider);
			}
		}

		let version = self.snap.load().version + 1;
		let snap = Arc::new(ProviderSnapshot { version, ordered, by_id });
		self.snap.store(Arc::clone(&snap));
		tracing::debug!(version, providers = snap.len(), "lens.registry.installed");
		Ok(snap)
	}
}
