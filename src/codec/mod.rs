//! Address codecs for the PoW mint.
//!
//! - `pow`: the sequential ID embedded in an address's text
//! - `register`: the register address derived from an ID

mod pow;
mod register;

pub use pow::{
    decode_pow, encode_pow, example_id, example_pow, is_pow, pow_digits, split_pow, PowId,
    PowParts, DEFAULT_PREFIX,
};
pub use register::{
    ProgramRegisters, RegisterDerivation, CREATOR_SEED, DEFAULT_PROGRAM_ID, REGISTER_SEED,
};
