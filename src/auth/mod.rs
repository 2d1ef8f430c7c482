//! Credential handling for users and admins.
//!
//! Passwords are stored as argon2id PHC strings. Callers are not issued tokens;
//! login only verifies that the supplied password matches the stored hash.

pub mod password_policy;

pub use password_policy::{PasswordPolicy, PasswordPolicyError};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::error;

use crate::errors::ServiceError;

impl From<PasswordPolicyError> for ServiceError {
    fn from(err: PasswordPolicyError) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

/// Hashes a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "Failed to hash password");
            ServiceError::HashError(e.to_string())
        })
}

/// Returns `Ok(false)` on mismatch. A stored hash that cannot be parsed is an error.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, ServiceError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        error!(error = %e, "Stored password hash is malformed");
        ServiceError::HashError(e.to_string())
    })?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ServiceError::HashError(e.to_string())),
    }
}
