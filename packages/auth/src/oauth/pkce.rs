// ABOUTME: PKCE (Proof Key for Code Exchange) for the redirect sign-in flow
// ABOUTME: Generates code verifiers and their S256 challenges

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

use crate::error::{AuthError, AuthResult};

const VERIFIER_LENGTH: usize = 64;

/// Verifier kept locally plus the challenge sent with the authorize request
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: &'static str,
}

impl PkceChallenge {
    /// Generate a fresh verifier (RFC 7636 allows 43-128 characters) and its S256 challenge
    pub fn generate() -> AuthResult<Self> {
        let code_verifier = random_alphanumeric(VERIFIER_LENGTH);
        if !(43..=128).contains(&code_verifier.len()) {
            return Err(AuthError::Pkce(format!(
                "Invalid code verifier length: {}",
                code_verifier.len()
            )));
        }

        let code_challenge = s256_challenge(&code_verifier);
        Ok(Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "s256",
        })
    }

    /// Check that a verifier hashes to this challenge
    pub fn verify(&self, verifier: &str) -> bool {
        s256_challenge(verifier) == self.code_challenge
    }
}

fn random_alphanumeric(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn s256_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}
