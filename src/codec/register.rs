//! Register address derivation.
//!
//! Every PoW ID owns one register account on the mint program, found at the
//! program-derived address of `["REGISTER", id as u32 little-endian]`.

use std::str::FromStr;

use crate::crypto::{find_program_address, Address, AddressError, DeriveError};

use super::PowId;

/// Seed tag for register accounts.
pub const REGISTER_SEED: &[u8] = b"REGISTER";

/// Seed tag for the mint authority.
pub const CREATOR_SEED: &[u8] = b"CREATOR";

/// The deployed mint program.
pub const DEFAULT_PROGRAM_ID: &str = "powCFRgLT5dRUdMXm4cBoajxM3S9gAcc54uvPrEwTcs";

/// Maps a PoW ID to a stable lookup address.
///
/// The search engine only relies on the mapping being deterministic; any
/// chain-specific scheme can sit behind it.
pub trait RegisterDerivation {
    fn derive_register(&self, id: PowId) -> Result<Address, DeriveError>;
}

/// Program-derived registers for a given program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramRegisters {
    program_id: Address,
}

impl ProgramRegisters {
    pub fn new(program_id: Address) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> &Address {
        &self.program_id
    }

    /// Register address together with its bump seed.
    pub fn register_with_bump(&self, id: PowId) -> Result<(Address, u8), DeriveError> {
        find_program_address(&[REGISTER_SEED, &id.to_le_bytes()], &self.program_id)
    }

    /// The program's mint authority.
    pub fn mint_authority(&self) -> Result<Address, DeriveError> {
        find_program_address(&[CREATOR_SEED], &self.program_id).map(|(address, _)| address)
    }
}

impl FromStr for ProgramRegisters {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self::new)
    }
}

impl RegisterDerivation for ProgramRegisters {
    fn derive_register(&self, id: PowId) -> Result<Address, DeriveError> {
        self.register_with_bump(id).map(|(address, _)| address)
    }
}
