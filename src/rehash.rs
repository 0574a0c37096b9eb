//! Bijective mixing of the user-provided hash, so that a poor or adversarial
//! user hash function doesn't correlate with the index's probe sequence.
//!
//! Ported from `node_ops.c`'s `REHASH` macro: two CRC32 computations over
//! the low and high halves of the hash, with fixed odd 64-bit seeds,
//! concatenated into the low/high 32 bits of a `u64`. The original uses the
//! hardware CRC32 instruction via GCC/Clang builtins (`__builtin_ia32_crc32di`
//! / `__builtin_arm_crc32d`); stable Rust has no portable equivalent, so this
//! uses `crc32fast`'s software/SIMD-accelerated implementation instead (see
//! DESIGN.md for the distribution-quality discussion).

const UPPER_SEED: u64 = 12_923_598_712_359_872_066;
const LOWER_SEED: u64 = 7_467_732_452_331_123_588;

/// Mixes a 64-bit hash into a new, decorrelated 64-bit value.
///
/// The low 32 bits are `crc32(hash, LOWER_SEED)`; the high 32 bits are
/// `crc32(hash, UPPER_SEED)`. Both seeds are folded into the running CRC32
/// state before the hash bytes are consumed, matching the two-argument
/// CRC32 builtin the original calls with `(seed, hash)`.
#[must_use]
pub fn rehash(hash: i64) -> u64 {
    let bytes = hash.to_le_bytes();
    let lower = crc32_with_seed(LOWER_SEED, &bytes) as u64;
    let upper = crc32_with_seed(UPPER_SEED, &bytes) as u64;
    lower | (upper << 32)
}

fn crc32_with_seed(seed: u64, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

/// The ideal ("distance 0") index position of a key under a given
/// `log_size`: `rehash(hash) >> (64 - log_size)`.
#[must_use]
pub fn distance_0(hash: i64, log_size: u32) -> u64 {
    debug_assert!(log_size > 0 && log_size <= 63);
    rehash(hash) >> (64 - log_size)
}
