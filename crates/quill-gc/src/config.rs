//! Tuning parameters for the collector (spec §4.5 "Parameters").
//!
//! Every field here is a runtime knob: an embedder can change them between
//! cycles via `quill-embed`'s GC-control surface (spec §6.1), not just at
//! `new_state` time.

/// Which cycle discipline the collector runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcMode {
    /// Interleave marking work with mutator allocations in proportion to
    /// debt; every live object is rescanned every cycle.
    Incremental,
    /// Minor cycles only trace new/survival-generation objects; old
    /// objects are skipped unless a write barrier promotes them onto a
    /// gray list (spec §4.5 "Generational (minor)").
    Generational,
}

/// Tunable parameters for one collector instance.
///
/// # Examples
///
/// ```
/// use quill_gc::GcConfig;
///
/// let config = GcConfig::default();
/// assert_eq!(config.pause_percent, 100);
///
/// let low_latency = GcConfig { step_size_bytes: 512, ..GcConfig::default() };
/// assert!(low_latency.step_size_bytes < config.step_size_bytes);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GcConfig {
    pub mode: GcMode,

    /// Percentage of currently-used memory the heap must grow by (relative
    /// to the size at the end of the last cycle) before the next cycle's
    /// debt threshold is crossed. 100 means "wait until the heap has
    /// doubled"; Lua's own default is 100 for incremental mode.
    pub pause_percent: u32,

    /// How many bytes of marking work to perform per byte allocated,
    /// expressed as a percentage (200 = trace 2 bytes worth of work per
    /// byte allocated). Higher values finish a cycle sooner at the cost of
    /// more mutator-visible marking work per allocation.
    pub step_multiplier_percent: u32,

    /// Debt increment, in bytes, that triggers one `Collector::step` call
    /// from the allocator fast path. Smaller steps mean smoother, more
    /// frequent small pauses; larger steps mean fewer, chunkier ones.
    pub step_size_bytes: usize,

    /// Generational-only: bytes-allocated-since-minor-collection threshold
    /// multiplier, analogous to `pause_percent` but for minor cycles.
    pub minor_multiplier_percent: u32,

    /// Generational-only: a minor cycle whose survival rate exceeds this
    /// percentage of the young generation promotes to a major cycle
    /// instead (too many survivors means incremental minors aren't
    /// paying for themselves).
    pub minor_major_percent: u32,

    /// Generational-only: after a major cycle, this percentage of the new
    /// heap size becomes the threshold for returning to minor-only
    /// collection.
    pub major_minor_percent: u32,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            mode: GcMode::Incremental,
            pause_percent: 100,
            step_multiplier_percent: 100,
            step_size_bytes: 1024,
            minor_multiplier_percent: 100,
            minor_major_percent: 70,
            major_minor_percent: 20,
        }
    }
}

impl GcConfig {
    /// Validate and clamp nonsensical values rather than letting the
    /// collector divide-by-zero or livelock; called once at `Collector`
    /// construction and whenever `quill-embed` applies new settings.
    pub fn sanitize(mut self) -> Self {
        self.pause_percent = self.pause_percent.max(1);
        self.step_multiplier_percent = self.step_multiplier_percent.max(1);
        self.step_size_bytes = self.step_size_bytes.max(16);
        self.minor_multiplier_percent = self.minor_multiplier_percent.max(1);
        self.minor_major_percent = self.minor_major_percent.clamp(1, 100);
        self.major_minor_percent = self.major_minor_percent.clamp(1, 100);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_incremental_and_sane() {
        let cfg = GcConfig::default();
        assert_eq!(cfg.mode, GcMode::Incremental);
        assert!(cfg.step_size_bytes > 0);
    }

    #[test]
    fn sanitize_clamps_zeroed_fields() {
        let cfg = GcConfig { pause_percent: 0, step_size_bytes: 0, ..GcConfig::default() }.sanitize();
        assert!(cfg.pause_percent >= 1);
        assert!(cfg.step_size_bytes >= 16);
    }
}
