//! services/api/src/adapters/password.rs
//!
//! Argon2 password hashing shared by both identity providers.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use pantry_core::{PortError, PortResult};

pub fn hash_password(password: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PortError::Unexpected(format!("Failed to hash password: {}", e)))
}

/// Fails with `Unauthorized` on a mismatch.
pub fn verify_password(password: &str, hashed: &str) -> PortResult<()> {
    let parsed = PasswordHash::new(hashed)
        .map_err(|e| PortError::Unexpected(format!("Failed to parse password hash: {}", e)))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| PortError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_only_the_original_password() {
        let hashed = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hashed).is_ok());
        assert!(matches!(verify_password("hunter3", &hashed), Err(PortError::Unauthorized)));
    }
}
