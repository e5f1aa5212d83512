//! Solana address representation and utilities.

use std::fmt;
use std::str::FromStr;

/// Errors produced when parsing an address from text.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid base-58 address: {0}")]
    InvalidBase58(String),

    #[error("Address must decode to 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// A Solana address: a 32-byte ed25519 public key (or program-derived key)
/// rendered as base-58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    /// Creates an address from raw bytes.
    #[inline]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the address as raw bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the base-58 text form. This is the string patterns match against.
    #[inline]
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| AddressError::InvalidBase58(e.to_string()))?;
        let bytes: [u8; 32] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::InvalidLength(decoded.len()))?;
        Ok(Self(bytes))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_base58())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_address() {
        let addr = Address::from_bytes([0u8; 32]);
        assert_eq!(addr.to_base58(), "11111111111111111111111111111111");
    }

    #[test]
    fn test_parse_round_trip() {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37).wrapping_add(11);
        }
        let addr = Address::from_bytes(bytes);
        let parsed: Address = addr.to_base58().parse().unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            "0OIl".parse::<Address>(),
            Err(AddressError::InvalidBase58(_))
        ));
        assert_eq!("111".parse::<Address>(), Err(AddressError::InvalidLength(3)));
    }
}
