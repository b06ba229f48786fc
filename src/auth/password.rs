use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

/// Hash a secret with a fresh random salt. The digest is self-describing
/// (algorithm and parameters embedded), so verification needs no extra state.
///
/// Used for user passwords and, identically, for signed refresh-token
/// strings before they are persisted.
pub fn hash_secret(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Verify a secret against a stored digest. Total: a malformed or empty
/// digest is simply a non-match, never an error. Refresh-token rows carry an
/// empty-string placeholder hash until issuance finishes, and that
/// placeholder must never verify.
pub fn verify_secret(plain: &str, digest: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_secret(password).expect("hashing should succeed");
        assert!(verify_secret(password, &hash));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_secret(password).expect("hashing should succeed");
        assert!(!verify_secret("wrong-password", &hash));
    }

    #[test]
    fn verify_is_false_on_malformed_digest() {
        assert!(!verify_secret("anything", "not-a-valid-hash"));
    }

    #[test]
    fn verify_is_false_on_empty_placeholder() {
        assert!(!verify_secret("anything", ""));
    }
}
