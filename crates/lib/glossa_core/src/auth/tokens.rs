//! Opaque token generation and at-rest hashing.

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of generated opaque tokens (alphanumeric chars, ~380 bits).
pub const OPAQUE_TOKEN_LEN: usize = 64;

/// Generate a cryptographically random token (64 alphanumeric chars).
pub fn generate_opaque_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(OPAQUE_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a token for storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Constant-time check that `token` hashes to `hash`.
pub fn verify_token_hash(token: &str, hash: &str) -> bool {
    hash_token(token).as_bytes().ct_eq(hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_tokens_are_alphanumeric_and_unique() {
        let a = generate_opaque_token();
        let b = generate_opaque_token();
        assert_eq!(a.len(), OPAQUE_TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable_hex_sha256() {
        let h = hash_token("abc");
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(h, hash_token("abc"));
    }

    #[test]
    fn verify_matches_only_the_original_token() {
        let token = generate_opaque_token();
        let hash = hash_token(&token);
        assert!(verify_token_hash(&token, &hash));
        assert!(!verify_token_hash("something-else", &hash));
        assert!(!verify_token_hash(&token, "short"));
    }

    #[test]
    fn verify_compares_every_digest_byte() {
        let hash = hash_token("abc");
        let mut tampered = hash.clone();
        tampered.pop();
        tampered.push(if hash.ends_with('0') { '1' } else { '0' });
        assert!(!verify_token_hash("abc", &tampered));
        assert!(!verify_token_hash("abc", ""));
        assert!(!verify_token_hash("abc", &hash.to_uppercase()));
    }
}
