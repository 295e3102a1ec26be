//! Password hashing (Argon2id). Grounded structurally on
//! `chronx-crypto::keypair::KeyPair`'s "hold the secret in a wipeable
//! buffer, expose only derived/public data" discipline — here the secret
//! material is the plaintext password, which is never retained past the
//! call that hashes or verifies it.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::CryptoError;

/// Builds an Argon2id instance at least as strong as the spec's "≥ 12
/// iteration-equivalent cost parameter" floor.
fn argon2(cost: u32) -> Argon2<'static> {
    let m_cost = 19 * 1024; // 19 MiB, OWASP recommended minimum for Argon2id
    let t_cost = cost.max(custodia_core::constants::MIN_PASSWORD_HASH_COST);
    let params = Params::new(m_cost, t_cost, 1, None).expect("static argon2 params are valid");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Hash `password` with a fresh random salt. `cost` is the iteration count
/// (callers should source it from the config store's `auth` service entry,
/// per the Open Question resolution in DESIGN.md — never hardcode it).
pub fn hash_password(password: &str, cost: u32) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    argon2(cost)
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CryptoError::PasswordHash(e.to_string()))
}

/// Verify `password` against a previously stored hash string. Uses the
/// scheme's own constant-time comparison internally.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<(), CryptoError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| CryptoError::PasswordHash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| CryptoError::PasswordMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrips() {
        let hash = hash_password("correct horse battery staple", 12).unwrap();
        assert!(verify_password("correct horse battery staple", &hash).is_ok());
        assert!(verify_password("wrong password", &hash).is_err());
    }

    #[test]
    fn two_hashes_of_same_password_differ() {
        let a = hash_password("hunter2", 12).unwrap();
        let b = hash_password("hunter2", 12).unwrap();
        assert_ne!(a, b);
    }
}
