//! Allocator facade and debt tracking (component D, spec §4.4).
//!
//! The spec's C ancestor routes every allocation through one
//! `realloc(ud, ptr, old_size, new_size)` callback so an embedder can plug
//! in arenas or accounting. A safe Rust port has no business handing an
//! embedder a raw pointer to rewrite in place (spec §1 "the core need only
//! expose a safe typed API to embedders" — the stack-based/pointer-based
//! surface is explicitly a presentation detail, not a requirement). This
//! facade keeps the *contract* — one seam all allocation flows through,
//! debt accounted the same way, emergency behavior available — while the
//! actual bytes live in ordinary Rust `Vec`/arena storage that
//! `quill-core` owns. The embedder's hook is consulted as a pass/fail
//! gate plus an accounting callback rather than a pointer-returning
//! function.
//!
//! `ptr == null && new_size > 0` becomes "first allocation of this slot";
//! `new_size == 0` becomes "this slot is being freed"; both map onto
//! `account_resize(old_size, new_size)` below, matching spec semantics
//! without the unsafety.

use crate::error::GcError;

/// `hook(old_size, new_size)` is called before every resize that grows
/// total usage; returning `false` simulates allocator failure (used by
/// embedders that want to impose a hard memory ceiling, or by tests that
/// want to exercise the out-of-memory path deterministically).
pub type ReallocFn = Box<dyn FnMut(usize, usize) -> bool>;

/// Tracks total bytes outstanding and GC debt (spec §4.4) and gates
/// growth through an optional embedder-supplied hook.
pub struct AllocFacade {
    hook: Option<ReallocFn>,
    total_bytes: u64,
    debt: i64,
    /// Set while servicing an emergency collection: no further
    /// allocations may be attempted and finalizers do not run (spec
    /// §4.5 "Emergency GC").
    pub in_emergency: bool,
}

impl std::fmt::Debug for AllocFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocFacade")
            .field("total_bytes", &self.total_bytes)
            .field("debt", &self.debt)
            .field("in_emergency", &self.in_emergency)
            .finish()
    }
}

impl Default for AllocFacade {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AllocFacade {
    pub fn new(hook: Option<ReallocFn>) -> Self {
        Self { hook, total_bytes: 0, debt: 0, in_emergency: false }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn debt(&self) -> i64 {
        self.debt
    }

    /// Account for a resize from `old_size` to `new_size` bytes. Both are
    /// zero for "no prior allocation" / "fully freed" respectively,
    /// matching the `ptr==null`/`new_size==0` cases of the C contract.
    pub fn account_resize(&mut self, old_size: usize, new_size: usize) -> Result<(), GcError> {
        if new_size > old_size {
            let growth = (new_size - old_size) as u64;
            if let Some(hook) = &mut self.hook {
                if !hook(old_size, new_size) {
                    return Err(GcError::OutOfMemory);
                }
            }
            self.total_bytes += growth;
            self.debt += growth as i64;
        } else {
            let shrink = (old_size - new_size) as u64;
            self.total_bytes = self.total_bytes.saturating_sub(shrink);
            self.debt -= shrink as i64;
        }
        Ok(())
    }

    /// Shorthand for a brand-new allocation of `size` bytes.
    pub fn account_alloc(&mut self, size: usize) -> Result<(), GcError> {
        self.account_resize(0, size)
    }

    /// Shorthand for freeing `size` bytes (sweep phase, explicit frees).
    pub fn account_free(&mut self, size: usize) {
        let _ = self.account_resize(size, 0);
    }

    /// Pay down debt after a collector step performs `bytes` worth of
    /// work, the way Lua's `luaE_setdebt` does after every marking step.
    pub fn pay_debt(&mut self, bytes: i64) {
        self.debt -= bytes;
    }

    pub fn set_debt(&mut self, debt: i64) {
        self.debt = debt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_increases_debt_and_total() {
        let mut alloc = AllocFacade::default();
        alloc.account_alloc(100).unwrap();
        assert_eq!(alloc.total_bytes(), 100);
        assert_eq!(alloc.debt(), 100);
    }

    #[test]
    fn hook_can_deny_growth() {
        let mut alloc = AllocFacade::new(Some(Box::new(|_old, _new| false)));
        assert!(alloc.account_alloc(16).is_err());
        assert_eq!(alloc.total_bytes(), 0);
    }

    #[test]
    fn free_reduces_total_without_consulting_hook() {
        let mut calls = 0;
        let mut alloc = AllocFacade::new(Some(Box::new(move |_old, _new| {
            calls += 1;
            true
        })));
        alloc.account_alloc(64).unwrap();
        alloc.account_free(64);
        assert_eq!(alloc.total_bytes(), 0);
    }
}
