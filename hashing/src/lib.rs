//! SHA-256 over the fixed-width inputs used by consensus code.
//!
//! Every function here hashes the concatenation of its arguments. Integers are encoded as
//! little-endian bytes.

use ethereum_types::H256;
use once_cell::sync::Lazy;
use sha2::{Digest as _, Sha256};

/// Number of precomputed zero subtree roots.
///
/// Deep enough for `BeaconState.validators` with a `2^40` limit plus the length mix-in.
pub const ZERO_HASH_COUNT: usize = 41;

/// `ZERO_HASHES[depth]` is the root of a Merkle tree of `2^depth` zero chunks.
pub static ZERO_HASHES: Lazy<[H256; ZERO_HASH_COUNT]> = Lazy::new(|| {
    let mut hashes = [H256::zero(); ZERO_HASH_COUNT];

    for depth in 1..ZERO_HASH_COUNT {
        hashes[depth] = hash_256_256(hashes[depth - 1], hashes[depth - 1]);
    }

    hashes
});

#[inline]
#[must_use]
pub fn hash_bytes(bytes: impl AsRef<[u8]>) -> H256 {
    H256(Sha256::digest(bytes).into())
}

fn finish(hasher: Sha256) -> H256 {
    H256(hasher.finalize().into())
}

#[inline]
#[must_use]
pub fn hash_256(bytes: H256) -> H256 {
    hash_bytes(bytes)
}

#[inline]
#[must_use]
pub fn hash_256_8(a: H256, b: u8) -> H256 {
    finish(Sha256::new().chain_update(a).chain_update([b]))
}

#[inline]
#[must_use]
pub fn hash_256_8_32(a: H256, b: u8, c: u32) -> H256 {
    finish(
        Sha256::new()
            .chain_update(a)
            .chain_update([b])
            .chain_update(c.to_le_bytes()),
    )
}

#[inline]
#[must_use]
pub fn hash_256_64(a: H256, b: u64) -> H256 {
    finish(Sha256::new().chain_update(a).chain_update(b.to_le_bytes()))
}

#[inline]
#[must_use]
pub fn hash_256_256(left: H256, right: H256) -> H256 {
    finish(Sha256::new().chain_update(left).chain_update(right))
}

// Callers pass `PublicKeyBytes`. The `bls` crate depends on this one, so the type cannot be named.
#[inline]
#[must_use]
pub fn hash_384(bytes: impl AsRef<[u8; 48]>) -> H256 {
    hash_bytes(bytes.as_ref())
}

// Callers pass `SignatureBytes`.
#[inline]
#[must_use]
pub fn hash_768(bytes: impl AsRef<[u8; 96]>) -> H256 {
    hash_bytes(bytes.as_ref())
}
