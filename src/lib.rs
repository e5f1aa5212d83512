//! # pow_vanity
//!
//! Multi-threaded Solana vanity keypair search with PoW address IDs.
//!
//! ## Architecture
//!
//! - `crypto`: ed25519 keypairs, base-58 addresses and program-derived addresses
//! - `codec`: the PoW ID embedded in an address and its register derivation
//! - `matcher`: search criteria and pattern matching
//! - `worker`: batch workers and the search coordinator
//! - `config`: Runtime configuration

pub mod codec;
pub mod config;
pub mod crypto;
pub mod matcher;
pub mod worker;

pub use codec::{decode_pow, encode_pow, is_pow, PowId, ProgramRegisters, RegisterDerivation};
pub use config::Config;
pub use crypto::{Address, Keypair};
pub use matcher::{Criteria, Pattern};
pub use worker::{MatchResult, SearchCoordinator, SearchEvent, SearchHandle, SearchOptions};
