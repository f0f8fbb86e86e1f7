//! Seeded hashing shared by the string table (component B) and the table
//! hash part (component C).
//!
//! Lua mixes a per-process random seed into every string hash to make
//! collision attacks against the hash table impractical. We do the same,
//! but the seed lives on [`GlobalState`](../quill_core/struct.GlobalState.html)
//! rather than a process-global, since one OS process may host several
//! independent VM instances (spec §5, §9).

use std::hash::Hasher;

use ahash::AHasher;

/// Draw a fresh 128-bit seed from OS randomness.
///
/// Used as the default when an embedder does not supply their own seed to
/// `new_state`. A caller-supplied seed (e.g. for reproducible fuzzing) is
/// equally valid — see spec §9 Open Questions.
pub fn os_random_seed() -> u64 {
    use rand::RngCore;
    rand::rngs::OsRng.next_u64()
}

/// Hash `bytes` mixed with `seed`. Used for short-string interning and for
/// any string used as a table key.
#[inline]
pub fn seeded_hash_bytes(seed: u64, bytes: &[u8]) -> u64 {
    let mut hasher = AHasher::default();
    hasher.write_u64(seed);
    hasher.write(bytes);
    hasher.finish()
}

/// Hash a 64-bit integer key the same way regardless of whether it arrived
/// as an integer `Value` or as a float that happens to hold an integral
/// value — spec §3.4 requires integer and float of equal value to hash
/// identically.
#[inline]
pub fn seeded_hash_i64(seed: u64, v: i64) -> u64 {
    let mut hasher = AHasher::default();
    hasher.write_u64(seed);
    hasher.write_i64(v);
    hasher.finish()
}

/// Hash an arbitrary 64-bit pattern (used for booleans, light userdata, and
/// any other "hash the bit pattern" key kind).
#[inline]
pub fn seeded_hash_bits(seed: u64, bits: u64) -> u64 {
    let mut hasher = AHasher::default();
    hasher.write_u64(seed);
    hasher.write_u64(bits);
    hasher.finish()
}
