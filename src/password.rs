//! Password hashing primitives (bcrypt, salted internally).

use bcrypt::{hash, verify, DEFAULT_COST};
use tracing::error;

use crate::error::ApiError;

/// Create a salted hash of the given password.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    hash(password, DEFAULT_COST).map_err(|err| {
        error!("Failed to hash and salt password: {err}");
        ApiError::unexpected("Unexpected server-side error")
    })
}

/// Check a plaintext password against a stored hash. Any bcrypt error is
/// treated as a non-match.
#[must_use]
pub fn verify_password(hashed: &str, password: &str) -> bool {
    verify(password, hashed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn hash_then_verify() -> Result<()> {
        // Low cost keeps the test fast; production uses DEFAULT_COST.
        let hashed = bcrypt::hash("s3cret", 4)?;
        assert!(verify_password(&hashed, "s3cret"));
        assert!(!verify_password(&hashed, "wrong"));
        Ok(())
    }

    #[test]
    fn malformed_hash_is_a_non_match() {
        assert!(!verify_password("not-a-bcrypt-hash", "s3cret"));
    }
}
