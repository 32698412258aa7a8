//! ID generation utilities with prefix support
//!
//! IDs look like Stripe's: `{prefix}_{random}` where the random part is
//! URL-safe base64 without padding. Every ID carries at least 96 bits of
//! entropy.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::RngCore;

const MIN_ID_BYTES: usize = 12;

/// Generate a prefixed ID with 96 bits of entropy
///
/// # Example
/// ```
/// use warden_core::id::generate_prefixed_id;
///
/// let id = generate_prefixed_id("lck");
/// assert!(id.starts_with("lck_"));
/// ```
pub fn generate_prefixed_id(prefix: &str) -> String {
    generate_prefixed_id_with_bytes(prefix, MIN_ID_BYTES)
}

/// Generate a prefixed ID with a custom number of random bytes
///
/// Requests below 12 bytes are raised to 12.
pub fn generate_prefixed_id_with_bytes(prefix: &str, bytes: usize) -> String {
    let mut random_bytes = vec![0u8; bytes.max(MIN_ID_BYTES)];
    rand::rng().fill_bytes(&mut random_bytes);

    let encoded = BASE64_URL_SAFE_NO_PAD.encode(random_bytes);

    format!("{prefix}_{encoded}")
}

/// Validate that a prefixed ID has the expected format
pub fn validate_prefixed_id(id: &str, expected_prefix: &str) -> bool {
    let Some(random_part) = id
        .strip_prefix(expected_prefix)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };

    match BASE64_URL_SAFE_NO_PAD.decode(random_part) {
        Ok(decoded) => decoded.len() >= MIN_ID_BYTES,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_prefixed_id() {
        let id = generate_prefixed_id("ses");
        assert!(id.starts_with("ses_"));

        let id2 = generate_prefixed_id("ses");
        assert_ne!(id, id2);
    }

    #[test]
    fn test_generate_prefixed_id_with_bytes() {
        let id = generate_prefixed_id_with_bytes("chl", 32);
        let decoded = BASE64_URL_SAFE_NO_PAD.decode(&id[4..]).unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn test_short_requests_are_raised_to_minimum() {
        let id = generate_prefixed_id_with_bytes("ses", 4);
        let decoded = BASE64_URL_SAFE_NO_PAD.decode(&id[4..]).unwrap();
        assert_eq!(decoded.len(), 12);
    }

    #[test]
    fn test_validate_prefixed_id() {
        let id = generate_prefixed_id("lck");
        assert!(validate_prefixed_id(&id, "lck"));
        assert!(!validate_prefixed_id(&id, "ses"));

        assert!(!validate_prefixed_id("lck", "lck"));
        assert!(!validate_prefixed_id("lck_", "lck"));
        assert!(!validate_prefixed_id("lck_invalid!", "lck"));
        assert!(!validate_prefixed_id("lckx_AAAAAAAAAAAAAAAA", "lck"));
    }

    #[test]
    fn test_id_is_url_safe() {
        let id = generate_prefixed_id("ses");
        assert!(
            id.chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        );
    }
}
