//! Password hashing and opaque token helpers

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::error::{AdminError, AdminResult};

/// Hash a password with argon2 and a fresh salt, returning a PHC string
pub fn hash_password(password: &str) -> AdminResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AdminError::Internal(format!("Failed to hash password: {}", e)))?
        .to_string();

    Ok(password_hash)
}

/// Check a password against a stored PHC string
pub fn verify_password(password_hash: &str, password: &str) -> AdminResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| AdminError::Internal(format!("Failed to parse password hash: {}", e)))?;

    let argon2 = Argon2::default();
    Ok(argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Run one argon2 verification against a throwaway hash so that a login
/// for an unknown account costs as much as one with a wrong password.
pub fn verify_against_dummy(password: &str) {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();
    let hash = DUMMY_HASH.get_or_init(|| hash_password(&random_token()).unwrap_or_default());
    let _ = verify_password(hash, password);
}

/// 32 random bytes, hex encoded
pub fn random_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// One-way digest used to store tokens that are only ever compared
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
