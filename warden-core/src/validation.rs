use crate::error::ValidationError;
use regex::Regex;
use std::sync::LazyLock;

/// Longest identifier accepted, matching the practical limit on email addresses.
const MAX_IDENTIFIER_LEN: usize = 254;

/// A verification code is exactly six ASCII digits.
static CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("Invalid verification code regex pattern"));

/// Normalizes a login identifier to its ledger key.
///
/// Identifiers are trimmed and ASCII-lowercased so that `Bob@X.com ` and
/// `bob@x.com` share one failure count and one lockout. Identifiers that do
/// not belong to any account are still valid: failures against them are
/// recorded like any other.
///
/// # Examples
///
/// ```rust
/// use warden_core::validation::normalize_identifier;
///
/// assert_eq!(normalize_identifier("  Bob@X.com ").unwrap(), "bob@x.com");
/// assert!(normalize_identifier("   ").is_err());
/// ```
pub fn normalize_identifier(identifier: &str) -> Result<String, ValidationError> {
    let trimmed = identifier.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(
            "Identifier is required".to_string(),
        ));
    }

    if trimmed.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::InvalidIdentifier(
            "Identifier is too long".to_string(),
        ));
    }

    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::InvalidIdentifier(
            "Identifier contains control characters".to_string(),
        ));
    }

    Ok(trimmed.to_ascii_lowercase())
}

/// Checks that a submitted verification code has the right shape.
///
/// Surrounding whitespace is tolerated; the returned value is trimmed.
pub fn validate_verification_code(code: &str) -> Result<&str, ValidationError> {
    let trimmed = code.trim();
    if CODE_REGEX.is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err(ValidationError::InvalidCode)
    }
}
