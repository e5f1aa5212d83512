//! Cryptographic operations for Solana key and address generation.
//!
//! This module provides:
//! - Secure random ed25519 keypair generation
//! - Base-58 address rendering and parsing
//! - Program-derived address computation

mod address;
mod keypair;
pub mod pda;

pub use address::{Address, AddressError};
pub use keypair::{GenerationError, Keypair, KeypairGenerator, SecureGenerator, KEYPAIR_LENGTH};
pub use pda::{find_program_address, DeriveError};
