//! Password hashing
//!
//! Argon2id with the crate's default parameters and a random salt per hash.
//! Hashes are stored in PHC string format.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::OnceLock;

/// Hash a password using Argon2id.
///
/// # Example
///
/// ```ignore
/// use vendo::services::password::hash_password;
///
/// let hash = hash_password("secret123")?;
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
        .context("Password hashing failed")?;

    Ok(password_hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch; an error only if the hash itself is
/// unreadable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
    }
}

/// Run a verification against a throwaway hash and report failure.
///
/// Used when the username is unknown so the response takes as long as a
/// wrong-password response.
pub fn verify_against_dummy(password: &str) -> Result<bool> {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();

    let hash = match DUMMY_HASH.get() {
        Some(hash) => hash,
        None => {
            let generated = hash_password("dummy-password-for-timing")?;
            DUMMY_HASH.get_or_init(|| generated)
        }
    };

    verify_password(password, hash)?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_argon2id() {
        let hash = hash_password("buyer12345").expect("Failed to hash password");
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("buyer12345"));
    }

    #[test]
    fn test_same_password_different_salt() {
        let first = hash_password("samepass1").expect("Failed to hash password");
        let second = hash_password("samepass1").expect("Failed to hash password");
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("correct123").expect("Failed to hash password");

        assert!(verify_password("correct123", &hash).unwrap());
        assert!(!verify_password("wrong12345", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_invalid_hash() {
        assert!(verify_password("password1", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_dummy_verification_never_succeeds() {
        assert!(!verify_against_dummy("dummy-password-for-timing").unwrap());
        assert!(!verify_against_dummy("anything1").unwrap());
    }
}
