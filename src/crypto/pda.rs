//! Program-derived address computation.
//!
//! Matches the runtime's `find_program_address`:
//!   hash = sha256(seed_0 || .. || seed_n || bump || program_id || "ProgramDerivedAddress")
//!   address = hash, accepted only if it is NOT a valid ed25519 point
//! Bumps are tried from 255 down to 0; the first off-curve hash wins.

use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha256};

use super::Address;

/// Domain-separation marker appended to every derivation.
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Maximum number of seeds and maximum length of each seed.
pub const MAX_SEEDS: usize = 16;
pub const MAX_SEED_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeriveError {
    #[error("Too many seeds: {0} (max {max})", max = MAX_SEEDS)]
    TooManySeeds(usize),

    #[error("Seed {index} is {len} bytes (max {max})", max = MAX_SEED_LEN)]
    SeedTooLong { index: usize, len: usize },

    #[error("No bump seed yields an off-curve address")]
    NoViableBump,
}

/// Returns true if the 32 bytes decompress to a point on the ed25519 curve.
#[inline]
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

/// Computes the address for an exact seed list (bump included by the caller).
///
/// Returns `None` when the hash lands on the curve and is therefore unusable.
pub fn create_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<Option<Address>, DeriveError> {
    if seeds.len() > MAX_SEEDS {
        return Err(DeriveError::TooManySeeds(seeds.len()));
    }
    if let Some((index, seed)) = seeds
        .iter()
        .enumerate()
        .find(|(_, s)| s.len() > MAX_SEED_LEN)
    {
        return Err(DeriveError::SeedTooLong {
            index,
            len: seed.len(),
        });
    }

    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    let hash: [u8; 32] = hasher.finalize().into();

    if is_on_curve(&hash) {
        Ok(None)
    } else {
        Ok(Some(Address::from_bytes(hash)))
    }
}

/// Finds the canonical program-derived address and its bump seed.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<(Address, u8), DeriveError> {
    // One slot is reserved for the bump.
    if seeds.len() >= MAX_SEEDS {
        return Err(DeriveError::TooManySeeds(seeds.len() + 1));
    }

    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 1);
        with_bump.extend_from_slice(seeds);
        with_bump.push(&bump_seed);

        if let Some(address) = create_program_address(&with_bump, program_id)? {
            return Ok((address, bump));
        }
    }

    Err(DeriveError::NoViableBump)
}
