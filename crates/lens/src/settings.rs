//! User-facing lens settings.
//!
//! Settings are plain serde data loaded from TOML. The host diffs a new value
//! against the current one in [`crate::LensHost::apply_settings`]; nothing in
//! here talks to the scheduler directly.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entry::AnchorKind;
use crate::error::SettingsError;
use crate::throttle::{DEFAULT_RECOVERY_TIME, DEFAULT_SIGNIFICANT_TIME, ThrottleConfig};

/// Default coalescing window for recomputation triggers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Maximum number of visible lenses per anchor kind and line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnchorLimits {
	pub top: usize,
	pub right: usize,
	pub near_scroll: usize,
	pub empty_space: usize,
}

impl Default for AnchorLimits {
	fn default() -> Self {
		Self {
			top: 5,
			right: 3,
			near_scroll: 3,
			empty_space: 3,
		}
	}
}

impl AnchorLimits {
	/// Limit for `kind`; [`AnchorKind::Default`] has no slot of its own and reports 0.
	pub fn get(&self, kind: AnchorKind) -> usize {
		match kind {
			AnchorKind::Top => self.top,
			AnchorKind::Right => self.right,
			AnchorKind::NearScroll => self.near_scroll,
			AnchorKind::EmptySpace => self.empty_space,
			AnchorKind::Default => 0,
		}
	}

	/// `(kind, limit)` pairs for every concrete kind.
	pub fn iter(&self) -> impl Iterator<Item = (AnchorKind, usize)> + '_ {
		AnchorKind::CONCRETE.into_iter().map(|kind| (kind, self.get(kind)))
	}
}

/// Throttle thresholds in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleSettings {
	pub significant_ms: u64,
	pub recovery_ms: u64,
}

impl Default for ThrottleSettings {
	fn default() -> Self {
		Self {
			significant_ms: DEFAULT_SIGNIFICANT_TIME.as_millis() as u64,
			recovery_ms: DEFAULT_RECOVERY_TIME.as_millis() as u64,
		}
	}
}

/// Lens configuration.
///
/// ```toml
/// enabled = true
/// debounce_ms = 100
/// default_anchor = "top"
/// disabled_groups = ["vcs.author"]
///
/// [anchor_limits]
/// top = 5
///
/// [group_anchors]
/// "references" = "right"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LensSettings {
	/// Top-level feature switch.
	pub enabled: bool,
	/// Coalescing window for recomputation triggers.
	pub debounce_ms: u64,
	/// Anchor used when neither the group nor the provider picks one.
	pub default_anchor: AnchorKind,
	pub anchor_limits: AnchorLimits,
	/// Provider groups switched off by the user or by policy.
	pub disabled_groups: BTreeSet<String>,
	/// Per-group anchor overrides.
	pub group_anchors: BTreeMap<String, AnchorKind>,
	pub throttle: ThrottleSettings,
}

impl Default for LensSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
			default_anchor: AnchorKind::Top,
			anchor_limits: AnchorLimits::default(),
			disabled_groups: BTreeSet::new(),
			group_anchors: BTreeMap::new(),
			throttle: ThrottleSettings::default(),
		}
	}
}

impl LensSettings {
	/// Parses and validates settings from TOML text. Missing keys take defaults.
	pub fn from_toml_str(input: &str) -> Result<Self, SettingsError> {
		let settings: Self = toml::from_str(input)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Reads and parses a settings file.
	pub fn load(path: &Path) -> Result<Self, SettingsError> {
		let input = std::fs::read_to_string(path).map_err(|error| SettingsError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&input)
	}

	pub fn to_toml_string(&self) -> Result<String, SettingsError> {
		Ok(toml::to_string_pretty(self)?)
	}

	pub fn validate(&self) -> Result<(), SettingsError> {
		if !self.default_anchor.is_concrete() {
			return Err(SettingsError::UnresolvedDefaultAnchor(self.default_anchor.as_str()));
		}
		if self.throttle.recovery_ms > self.throttle.significant_ms {
			return Err(SettingsError::ThrottleThresholds {
				recovery_ms: self.throttle.recovery_ms,
				significant_ms: self.throttle.significant_ms,
			});
		}
		Ok(())
	}

	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}

	pub fn throttle_config(&self) -> ThrottleConfig {
		ThrottleConfig {
			significant: Duration::from_millis(self.throttle.significant_ms),
			recovery: Duration::from_millis(self.throttle.recovery_ms),
		}
	}

	pub fn is_group_disabled(&self, group: &str) -> bool {
		self.disabled_groups.contains(group)
	}

	/// Resolves the anchor for a provider of `group` declaring `provider_default`.
	pub fn anchor_for(&self, group: &str, provider_default: AnchorKind) -> AnchorKind {
		match self.group_anchors.get(group) {
			Some(&kind) if kind.is_concrete() => kind,
			_ if provider_default.is_concrete() => provider_default,
			_ => self.default_anchor,
		}
	}
}
