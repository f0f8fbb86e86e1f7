//! Runtime configuration (spec §6.3).
//!
//! Mirrors `faxt/src/config.rs`'s load/save-to-TOML shape. Integer and
//! float width are fixed at `i64`/`f64` for this port (documented as an
//! Open Question decision in the top-level design notes) so they are not
//! configurable fields here; everything spec §6.3 does call out as a
//! runtime knob is.

use serde::{Deserialize, Serialize};
use std::path::Path;

use quill_gc::{GcConfig, GcMode};

use crate::error::{EmbedError, EmbedResult};

/// Default configuration file name an embedder may ship alongside a host
/// binary.
pub const CONFIG_FILE_NAME: &str = "quill.toml";

/// Top-level runtime configuration: VM-side knobs plus the collector's
/// own tuning parameters (spec §4.5, §6.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VmConfig {
    /// Short-string interning cap in bytes (default 40, `LUAI_MAXSHORTLEN`).
    #[serde(default = "default_short_string_cap")]
    pub short_string_cap: usize,

    /// Maximum nested host-call depth (default 200, `LUAI_MAXCCALLS`).
    #[serde(default = "default_max_c_calls")]
    pub max_c_calls: u32,

    /// Minimum stack reserve for a host callee (default 20, `LUA_MINSTACK`).
    #[serde(default = "default_min_stack")]
    pub min_stack: usize,

    /// Explicit seed for the string-hash/table-hash seed; `None` means
    /// "derive from OS randomness" (spec §9's open question on seeding).
    #[serde(default)]
    pub hash_seed: Option<u64>,

    #[serde(default)]
    pub gc: GcSettings,
}

/// The collector's tunables, mirrored from [`quill_gc::GcConfig`] as a
/// serializable twin so `VmConfig` round-trips through TOML without
/// `quill-gc` itself depending on `serde`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GcSettings {
    #[serde(default)]
    pub mode: GcModeSetting,
    #[serde(default = "default_pause_percent")]
    pub pause_percent: u32,
    #[serde(default = "default_step_multiplier_percent")]
    pub step_multiplier_percent: u32,
    #[serde(default = "default_step_size_bytes")]
    pub step_size_bytes: usize,
    #[serde(default = "default_minor_multiplier_percent")]
    pub minor_multiplier_percent: u32,
    #[serde(default = "default_minor_major_percent")]
    pub minor_major_percent: u32,
    #[serde(default = "default_major_minor_percent")]
    pub major_minor_percent: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GcModeSetting {
    #[default]
    Incremental,
    Generational,
}

impl From<GcModeSetting> for GcMode {
    fn from(m: GcModeSetting) -> Self {
        match m {
            GcModeSetting::Incremental => GcMode::Incremental,
            GcModeSetting::Generational => GcMode::Generational,
        }
    }
}

fn default_short_string_cap() -> usize {
    40
}
fn default_max_c_calls() -> u32 {
    200
}
fn default_min_stack() -> usize {
    20
}
fn default_pause_percent() -> u32 {
    GcConfig::default().pause_percent
}
fn default_step_multiplier_percent() -> u32 {
    GcConfig::default().step_multiplier_percent
}
fn default_step_size_bytes() -> usize {
    GcConfig::default().step_size_bytes
}
fn default_minor_multiplier_percent() -> u32 {
    GcConfig::default().minor_multiplier_percent
}
fn default_minor_major_percent() -> u32 {
    GcConfig::default().minor_major_percent
}
fn default_major_minor_percent() -> u32 {
    GcConfig::default().major_minor_percent
}

impl Default for GcSettings {
    fn default() -> Self {
        let d = GcConfig::default();
        GcSettings {
            mode: GcModeSetting::Incremental,
            pause_percent: d.pause_percent,
            step_multiplier_percent: d.step_multiplier_percent,
            step_size_bytes: d.step_size_bytes,
            minor_multiplier_percent: d.minor_multiplier_percent,
            minor_major_percent: d.minor_major_percent,
            major_minor_percent: d.major_minor_percent,
        }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            short_string_cap: default_short_string_cap(),
            max_c_calls: default_max_c_calls(),
            min_stack: default_min_stack(),
            hash_seed: None,
            gc: GcSettings::default(),
        }
    }
}

impl VmConfig {
    pub fn load_from_path(path: &Path) -> EmbedResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EmbedError::Core(quill_core::CoreError::BadArgument { index: 0, message: e.to_string() }))?;
        toml::from_str(&content).map_err(|e| EmbedError::Core(quill_core::CoreError::BadArgument { index: 0, message: e.to_string() }))
    }

    pub fn save_to_path(&self, path: &Path) -> EmbedResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EmbedError::Core(quill_core::CoreError::BadArgument { index: 0, message: e.to_string() }))?;
        }
        let content = toml::to_string_pretty(self).expect("VmConfig always serializes");
        std::fs::write(path, content).map_err(|e| EmbedError::Core(quill_core::CoreError::BadArgument { index: 0, message: e.to_string() }))
    }

    pub fn to_gc_config(&self) -> GcConfig {
        GcConfig {
            mode: self.gc.mode.into(),
            pause_percent: self.gc.pause_percent,
            step_multiplier_percent: self.gc.step_multiplier_percent,
            step_size_bytes: self.gc.step_size_bytes,
            minor_multiplier_percent: self.gc.minor_multiplier_percent,
            minor_major_percent: self.gc.minor_major_percent,
            major_minor_percent: self.gc.major_minor_percent,
        }
        .sanitize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_matches_spec_constants() {
        let c = VmConfig::default();
        assert_eq!(c.short_string_cap, 40);
        assert_eq!(c.max_c_calls, 200);
        assert_eq!(c.min_stack, 20);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quill.toml");
        let mut cfg = VmConfig::default();
        cfg.short_string_cap = 64;
        cfg.gc.mode = GcModeSetting::Generational;
        cfg.save_to_path(&path).unwrap();
        let loaded = VmConfig::load_from_path(&path).unwrap();
        assert_eq!(cfg, loaded);
    }
}
