//! Proof-of-work ID scheme.
//!
//! A PoW address reads `<prefix><digits><rest>`: the decimal run directly
//! after the literal prefix is the sequential ID. The run is greedy and stops
//! at the first non-digit character.

use std::fmt;

use rand::Rng;

use crate::crypto::{GenerationError, Keypair};

/// Sequential ID carried by a PoW address.
///
/// Four bytes wide because the register seed is its little-endian encoding.
pub type PowId = u32;

/// Prefix used by the mint program.
pub const DEFAULT_PREFIX: &str = "pow";

/// Synthetic example addresses are cut to this many characters.
const EXAMPLE_LEN: usize = 40;

/// An address split around its ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowParts {
    pub prefix: String,
    pub digits: String,
    pub suffix: String,
}

impl PowParts {
    /// Parses the digit run back into an ID.
    pub fn id(&self) -> Option<PowId> {
        parse_digits(&self.digits)
    }
}

impl fmt::Display for PowParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, self.digits, self.suffix)
    }
}

/// Returns the maximal digit run that directly follows `prefix`.
#[inline]
pub fn pow_digits<'a>(address: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = address.strip_prefix(prefix)?;
    let len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if len == 0 {
        None
    } else {
        Some(&rest[..len])
    }
}

/// Canonical IDs never start with `0` (base-58 has no zero digit) and must
/// fit in a [`PowId`].
#[inline]
fn parse_digits(digits: &str) -> Option<PowId> {
    if digits.is_empty() || digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

/// Extracts the ID of a PoW address.
///
/// Returns `None` when the address does not start with `prefix`, when no digit
/// follows it, or when the run is not a canonical [`PowId`]. Never panics.
pub fn decode_pow(address: &str, prefix: &str) -> Option<PowId> {
    pow_digits(address, prefix).and_then(parse_digits)
}

/// Returns true if `address` carries the PoW pattern: the prefix followed by
/// a digit run whose first digit is non-zero.
#[inline]
pub fn is_pow(address: &str, prefix: &str) -> bool {
    pow_digits(address, prefix).is_some_and(|digits| !digits.starts_with('0'))
}

/// Splits a real address into prefix, ID digits and remainder.
pub fn split_pow(address: &str, prefix: &str) -> Option<PowParts> {
    let digits = pow_digits(address, prefix)?;
    parse_digits(digits)?;

    Some(PowParts {
        prefix: prefix.to_string(),
        digits: digits.to_string(),
        suffix: address[prefix.len() + digits.len()..].to_string(),
    })
}

/// Builds a display address carrying `id`, using `filler` for the remainder.
///
/// If the remainder would start with a digit it is swapped for the last
/// non-digit character of `filler`, so decoding the result yields exactly `id`.
/// Returns `None` for `id == 0`, which has no canonical encoding.
pub fn encode_pow(id: PowId, prefix: &str, filler: &str) -> Option<PowParts> {
    if id == 0 {
        return None;
    }

    let digits = id.to_string();
    let start = prefix.len() + digits.len();
    let mut suffix: String = filler
        .chars()
        .skip(start)
        .take(EXAMPLE_LEN.saturating_sub(start))
        .collect();

    if suffix.starts_with(|c: char| c.is_ascii_digit()) {
        let replacement = filler
            .chars()
            .rev()
            .find(|c| !c.is_ascii_digit())
            .unwrap_or('x');
        suffix.replace_range(..1, replacement.encode_utf8(&mut [0u8; 4]));
    }

    Some(PowParts {
        prefix: prefix.to_string(),
        digits,
        suffix,
    })
}

/// Picks a four-digit example ID, replacing every `0` with a random non-zero
/// digit so it could occur in a real base-58 address.
pub fn example_id<R: Rng + ?Sized>(rng: &mut R) -> PowId {
    let raw: PowId = rng.gen_range(1000..=9999);
    raw.to_string()
        .chars()
        .map(|c| match c.to_digit(10) {
            Some(0) | None => rng.gen_range(1..=9),
            Some(d) => d,
        })
        .fold(0, |acc, d| acc * 10 + d)
}

/// Produces a synthetic PoW address for display.
pub fn example_pow(prefix: &str) -> Result<PowParts, GenerationError> {
    let id = example_id(&mut rand::thread_rng());
    let filler = Keypair::generate()?.address().to_base58();
    Ok(encode_pow(id, prefix, &filler).unwrap_or_else(|| PowParts {
        prefix: prefix.to_string(),
        digits: String::new(),
        suffix: filler,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILLER: &str = "7Np41oeYqPefeNQEHSv1UDhYrehxin3NStELsSKCT4K2";

    #[test]
    fn test_round_trip() {
        for id in 1..=9999 {
            let parts = encode_pow(id, "pow", FILLER).unwrap();
            assert_eq!(decode_pow(&parts.to_string(), "pow"), Some(id), "id {}", id);
            assert_eq!(parts.id(), Some(id));
        }
    }

    #[test]
    fn test_digit_suffix_is_disambiguated() {
        // Without the swap "pow12" + "9yyyy" would read 129.
        let parts = encode_pow(12, "pow", "xxxxx9yyyy").unwrap();
        assert_eq!(parts.suffix, "yyyyy");
        assert!(!parts.suffix.starts_with(|c: char| c.is_ascii_digit()));
        assert_eq!(decode_pow(&parts.to_string(), "pow"), Some(12));
    }

    #[test]
    fn test_example_length() {
        let parts = encode_pow(1234, "pow", FILLER).unwrap();
        assert_eq!(parts.to_string().len(), EXAMPLE_LEN);
    }

    #[test]
    fn test_encode_zero() {
        assert_eq!(encode_pow(0, "pow", FILLER), None);
    }

    #[test]
    fn test_greedy_digit_run() {
        assert_eq!(decode_pow("pow1029abc", "pow"), Some(1029));
        assert_eq!(decode_pow("pow42", "pow"), Some(42));
    }

    #[test]
    fn test_no_prefix() {
        assert_eq!(decode_pow("xyz123", "pow"), None);
        assert_eq!(decode_pow("", "pow"), None);
        assert_eq!(decode_pow("po", "pow"), None);
    }

    #[test]
    fn test_empty_digit_run() {
        assert_eq!(decode_pow("powabc", "pow"), None);
        assert_eq!(decode_pow("pow", "pow"), None);
    }

    #[test]
    fn test_leading_zero_and_overflow() {
        assert_eq!(decode_pow("pow0123x", "pow"), None);
        assert!(!is_pow("pow0123x", "pow"));
        assert_eq!(decode_pow("pow4294967295x", "pow"), Some(u32::MAX));
        assert_eq!(decode_pow("pow4294967296x", "pow"), None);
        // Still the pattern even though the ID does not fit.
        assert!(is_pow("pow4294967296x", "pow"));
    }

    #[test]
    fn test_non_ascii_tail() {
        assert_eq!(decode_pow("pow7é", "pow"), Some(7));
        assert_eq!(decode_pow("powé7", "pow"), None);
    }

    #[test]
    fn test_split() {
        let parts = split_pow("pow512Hkq", "pow").unwrap();
        assert_eq!(parts.prefix, "pow");
        assert_eq!(parts.digits, "512");
        assert_eq!(parts.suffix, "Hkq");
        assert_eq!(parts.to_string(), "pow512Hkq");

        assert_eq!(split_pow("powHkq", "pow"), None);
    }

    #[test]
    fn test_example_id_has_no_zero() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let id = example_id(&mut rng);
            assert!((1111..=9999).contains(&id));
            assert!(!id.to_string().contains('0'));
        }
    }

    #[test]
    fn test_example_pow_decodes() {
        let parts = example_pow("pow").unwrap();
        let id = decode_pow(&parts.to_string(), "pow").unwrap();
        assert_eq!(Some(id), parts.id());
    }
}
