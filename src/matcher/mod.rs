//! Pattern matching for Solana addresses.
//!
//! Supports the criteria a search session can select:
//! - Pow: the PoW prefix followed by an ID digit run
//! - Start: match at the start of the address
//! - End: match at the end of the address
//! - StartAndEnd: both anchors at once

mod pattern;

pub use pattern::{find_invalid_char, Criteria, Pattern, BASE58_ALPHABET};
