//! Cryptographic utilities for challenge tokens and verification codes
//!
//! Challenge tokens are bearer credentials and verification codes are short
//! secrets, so neither is ever stored in plaintext:
//!
//! 1. Tokens are stored as their SHA256 hash and looked up by hash
//! 2. Codes are stored as SHA256 over `token:code`, binding each code to the
//!    token it was issued for
//! 3. Comparisons use constant-time equality via the `subtle` crate
//!
//! SHA256 is sufficient for the 256-bit tokens. A bare 6-digit code would be
//! trivially reversible from its hash, which is why it is salted with the
//! token; the per-token attempt cap bounds online guessing.

use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::id::generate_prefixed_id_with_bytes;

/// Number of digits in a verification code.
pub const CODE_DIGITS: usize = 6;

/// Generate an opaque challenge token with 256 bits of entropy, e.g. `chl_3q2-...`.
pub fn generate_challenge_token() -> String {
    generate_prefixed_id_with_bytes("chl", 32)
}

/// Generate a uniformly random numeric verification code, zero padded.
pub fn generate_verification_code() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{code:0width$}", width = CODE_DIGITS)
}

/// Hash a token for storage and lookup using SHA256, hex encoded.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a verification code bound to the token it was issued for.
pub fn hash_code(token: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of two byte slices.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
