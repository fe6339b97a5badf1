//! Password hashing via bcrypt.

use std::sync::LazyLock;

use super::AuthError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

/// Stand-in hash checked when a login names no password account.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("glossa-dummy-password").ok());

/// Spend one bcrypt verification against a stand-in hash and report a
/// mismatch, so unknown accounts cost the same as a wrong password.
pub fn verify_dummy_password(password: &str) -> bool {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = bcrypt::verify(password, hash);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("Str0ngPass!").unwrap();
        assert!(verify_password("Str0ngPass!", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn dummy_verification_runs_bcrypt_and_never_matches() {
        assert!(DUMMY_HASH.as_deref().is_some_and(|h| h.starts_with("$2")));
        assert!(!verify_dummy_password("glossa-dummy-password"));
        assert!(!verify_dummy_password("Str0ngPass!"));
    }
}
