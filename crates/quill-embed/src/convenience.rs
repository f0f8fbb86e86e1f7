//! Outermost host-facing helpers (spec §6.1 supplement): the one place in
//! this crate where `anyhow::Result` replaces the typed `thiserror` result
//! aliases used everywhere else, for hosts that just want a string-bearing
//! error and don't care to match on [`crate::error::EmbedError`]'s
//! variants.

use std::path::Path;

use anyhow::{Context, Result};
use quill_core::Value;
use quill_gc::GcObjectId;

use crate::config::VmConfig;
use crate::state::State;

/// Build a [`State`] from a TOML config file on disk, falling back to
/// defaults when the path doesn't exist (mirrors `faxt`'s "config file is
/// optional" convention).
pub fn new_state_from_config_file(path: &Path, seed: Option<u64>) -> Result<State> {
    let config = if path.exists() {
        VmConfig::load_from_path(path).with_context(|| format!("loading VM config from {}", path.display()))?
    } else {
        VmConfig::default()
    };
    Ok(State::new_state(&config, seed))
}

/// Load a previously dumped chunk and immediately call it with `args`,
/// discarding all but `nresults` return values. Convenient for a host
/// that just wants "run this precompiled chunk" without separately
/// holding onto the closure value.
pub fn eval_bytecode(state: &mut State, thread: GcObjectId, bytes: &[u8], env: Option<Value>, args: &[Value], nresults: usize) -> Result<Vec<Value>> {
    let closure = crate::load::load_bytecode(state, bytes, env).context("loading bytecode chunk")?;
    crate::call::call(state, thread, closure, args, nresults).context("calling loaded chunk")
}

/// Round-trip a prototype through [`crate::load::dump_bytecode`] and
/// [`crate::load::load_bytecode`], handing back the freshly loaded
/// closure. Mainly useful for tests and for hosts caching a compiled
/// chunk to disk between runs.
pub fn recompile_proto(state: &mut State, proto_id: GcObjectId, env: Option<Value>) -> Result<Value> {
    let bytes = crate::load::dump_bytecode(state, proto_id);
    crate::load::load_bytecode(state, &bytes, env).context("reloading dumped bytecode")
}
