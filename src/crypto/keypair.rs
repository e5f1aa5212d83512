//! Solana (ed25519) keypair generation.

use ed25519_dalek::SigningKey;
use rand::RngCore;

use super::Address;

/// Length of the exported keypair: secret seed followed by public key.
pub const KEYPAIR_LENGTH: usize = 64;

/// Errors that can occur while producing a keypair.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Secure randomness unavailable: {0}")]
    Entropy(#[from] rand::Error),

    #[error("Invalid keypair bytes: {0}")]
    InvalidKeypair(#[from] ed25519_dalek::SignatureError),
}

/// Produces fresh keypairs for the search loop.
///
/// Implementations are shared by every worker of a session, so each call must
/// be independent of the others.
pub trait KeypairGenerator: Send + Sync {
    fn generate(&self) -> Result<Keypair, GenerationError>;
}

/// Draws each secret seed from the thread-local CSPRNG (reseeded from the OS).
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureGenerator;

impl KeypairGenerator for SecureGenerator {
    #[inline]
    fn generate(&self) -> Result<Keypair, GenerationError> {
        Keypair::generate()
    }
}

/// Represents a Solana keypair (ed25519 secret seed + derived address).
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    address: Address,
}

impl Keypair {
    /// Generates a new random keypair.
    ///
    /// Uses a cryptographically secure random number generator. Fails only if
    /// the randomness source reports an error.
    #[inline]
    pub fn generate() -> Result<Self, GenerationError> {
        let mut seed = [0u8; 32];
        rand::thread_rng().try_fill_bytes(&mut seed)?;
        Ok(Self::from_secret_key(seed))
    }

    /// Derives a keypair from an existing 32-byte secret seed.
    pub fn from_secret_key(secret_bytes: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&secret_bytes);
        let address = Address::from_bytes(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// Imports the 64-byte export form, checking that the public half belongs
    /// to the secret half.
    pub fn from_bytes(bytes: &[u8; KEYPAIR_LENGTH]) -> Result<Self, GenerationError> {
        let signing_key = SigningKey::from_keypair_bytes(bytes)?;
        let address = Address::from_bytes(signing_key.verifying_key().to_bytes());
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Returns the secret seed followed by the public key.
    pub fn to_bytes(&self) -> [u8; KEYPAIR_LENGTH] {
        self.signing_key.to_keypair_bytes()
    }

    /// Returns the secret seed bytes.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Returns a reference to the derived address.
    #[inline]
    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unhex(s: &str) -> [u8; 32] {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_keypair_generation() {
        let keypair = Keypair::generate().unwrap();
        let bytes = keypair.to_bytes();
        assert_eq!(&bytes[..32], &keypair.secret_bytes());
        assert_eq!(&bytes[32..], keypair.address().as_bytes());
    }

    #[test]
    fn test_deterministic_address() {
        // RFC 8032, section 7.1, test 1
        let secret = unhex("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60");
        let public = unhex("d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a");

        let keypair = Keypair::from_secret_key(secret);
        assert_eq!(keypair.address().as_bytes(), &public);
        assert_eq!(
            keypair.address().to_base58(),
            "FVen3X669xLzsi6N2V91DoiyzHzg1uAgqiT8jZ9nS96Z"
        );
    }

    #[test]
    fn test_import_export() {
        let keypair = Keypair::generate().unwrap();
        let imported = Keypair::from_bytes(&keypair.to_bytes()).unwrap();
        assert_eq!(imported.address(), keypair.address());
    }

    #[test]
    fn test_import_rejects_mismatched_public_key() {
        let mut bytes = Keypair::generate().unwrap().to_bytes();
        bytes[40] ^= 0xff;
        assert!(Keypair::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_debug_shows_address() {
        let keypair = Keypair::from_secret_key([7u8; 32]);
        let printed = format!("{:?}", keypair);
        assert!(printed.contains(&keypair.address().to_base58()));
    }
}
