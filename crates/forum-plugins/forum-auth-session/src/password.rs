//! Argon2-based implementation of `Credentials`.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use forum_core::error::{AppError, Result};
use forum_core::traits::Credentials;

const SALT_BYTES: usize = 16;

#[derive(Default)]
pub struct Argon2Credentials {
    argon2: Argon2<'static>,
}

impl Argon2Credentials {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Credentials for Argon2Credentials {
    /// Produces a PHC string (`$argon2id$v=19$...`) with a fresh random salt.
    fn hash_password(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; SALT_BYTES];
        getrandom::getrandom(&mut salt)
            .map_err(|e| AppError::Allocation(format!("secure random source unavailable: {e}")))?;
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| AppError::Internal(format!("salt encoding failed: {e}")))?;

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
    }

    /// Verifies a password against a stored PHC string. Malformed hashes never match.
    fn verify_password(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(_) => return false,
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }
}
