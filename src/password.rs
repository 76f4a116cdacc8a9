//! Employee password hashing. Values are argon2id PHC strings
//! (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`).

use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

/// Hash a plain password with argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| e.to_string())
}

/// Verify a plain password against an argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let encoded = hash_password("s3cret").unwrap();
        assert!(encoded.starts_with("$argon2id$"));
        assert!(verify_password("s3cret", &encoded));
        assert!(!verify_password("wrong", &encoded));
    }

    #[test]
    fn hashes_carry_their_work_factor() {
        let encoded = hash_password("s3cret").unwrap();
        let parsed = PasswordHash::new(&encoded).unwrap();
        assert_eq!(parsed.algorithm.as_str(), "argon2id");
        assert!(parsed.params.get("m").is_some());
        assert!(parsed.params.get("t").is_some());
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(
            hash_password("same").unwrap(),
            hash_password("same").unwrap()
        );
    }

    #[test]
    fn malformed_values_never_verify() {
        assert!(!verify_password("x", "x"));
        assert!(!verify_password("x", "sha256$salt$abc"));
    }
}
