//! quill-embed — the typed, non-stack-based facade a host application
//! embeds (spec §6.1).
//!
//! Grounded on `faxc-runtime`'s thin-facade-over-engine pattern: this
//! crate adds no execution semantics of its own, it just exposes
//! `quill-core`/`quill-vm` operations behind a safe, documented surface
//! a host can link against without reaching into the engine crates
//! directly. Matches `faxt`'s layering choice (`faxt/src/error.rs`):
//! typed `thiserror` results everywhere a caller needs to match on error
//! kind, `anyhow::Result` only at the outermost host-facing convenience
//! functions in [`convenience`].

pub mod call;
pub mod config;
pub mod convenience;
pub mod debug;
pub mod error;
pub mod gc_api;
pub mod hooks;
pub mod load;
pub mod registry;
pub mod state;
pub mod table_api;
pub mod value_api;

pub use call::{call, close_coroutine, coroutine_status, create_coroutine, is_yieldable, pcall, resume_coroutine};
pub use config::VmConfig;
pub use error::{EmbedError, EmbedResult, LoadError};
pub use gc_api::GcControl;
pub use load::load_bytecode;
pub use state::State;

/// Semantic-version string an embedder can assert ABI-style compatibility
/// against (spec §6.1 supplement, grounded in `lua.h`'s `LUA_VERSION_NUM`
/// — reframed as a string since bit-exact ABI matching is out of scope).
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Numeric form of [`version`] for embedders that prefer a comparable
/// integer, `major * 10_000 + minor * 100 + patch`.
pub fn api_version() -> u32 {
    const_version()
}

const fn const_version() -> u32 {
    // CARGO_PKG_VERSION_{MAJOR,MINOR,PATCH} are guaranteed numeric by cargo.
    let major: u32 = parse_u32(env!("CARGO_PKG_VERSION_MAJOR"));
    let minor: u32 = parse_u32(env!("CARGO_PKG_VERSION_MINOR"));
    let patch: u32 = parse_u32(env!("CARGO_PKG_VERSION_PATCH"));
    major * 10_000 + minor * 100 + patch
}

const fn parse_u32(s: &str) -> u32 {
    let bytes = s.as_bytes();
    let mut value = 0u32;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}
