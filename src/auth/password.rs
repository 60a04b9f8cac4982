use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::error;

use crate::users::policy::{PasswordPolicy, StrongPassword};

lazy_static! {
    // Hash of a password nobody holds; lets lookups for unknown accounts
    // spend the same argon2 work as real ones.
    static ref DUMMY_HASH: Option<String> = PasswordPolicy::default()
        .accept("Nobody#Holds9This")
        .ok()
        .and_then(|p| hash_password(p).ok());
}

/// Hashes a password that already passed the policy.
pub fn hash_password(plain: StrongPassword<'_>) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_str().as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Runs a full verification against `DUMMY_HASH` and discards the result.
pub fn verify_dummy(plain: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(plain, hash);
    }
}
