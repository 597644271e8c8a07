//! Password hashing and verification.
//!
//! bcrypt is CPU-bound, so both operations run on the blocking thread pool
//! to keep the async runtime responsive.

use crate::AccessError;
use bcrypt::{hash, verify};

/// The bcrypt cost used when the caller does not configure one.
pub const DEFAULT_PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;

/// Hashes a password with bcrypt at the given cost.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AccessError> {
    let password = password.to_string();

    tokio::task::spawn_blocking(move || {
        hash(password, cost).map_err(|e| AccessError::PasswordHashing(e.to_string()))
    })
    .await
    .map_err(|e| AccessError::PasswordHashing(format!("Task join error: {e}")))?
}

/// Verifies a password against a stored bcrypt hash.
///
/// Returns `Ok(false)` on a mismatch; `Err` only when the hash itself is unusable.
pub async fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AccessError> {
    let password = password.to_string();
    let stored_hash = stored_hash.to_string();

    tokio::task::spawn_blocking(move || {
        verify(password, &stored_hash).map_err(|e| AccessError::PasswordHashing(e.to_string()))
    })
    .await
    .map_err(|e| AccessError::PasswordHashing(format!("Task join error: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify_roundtrip() {
        let hashed = hash_password("s3cret", 4).await.unwrap();

        assert_ne!(hashed, "s3cret");
        assert!(verify_password("s3cret", &hashed).await.unwrap());
        assert!(!verify_password("wrong", &hashed).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_against_garbage_hash_is_an_error() {
        let result = verify_password("anything", "not-a-bcrypt-hash").await;
        assert!(matches!(result, Err(AccessError::PasswordHashing(_))));
    }
}
