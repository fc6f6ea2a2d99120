//! Signing seam for write submissions.

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use gluon_core::{JournalResult, Pubkey};
use std::fmt;

/// Source of the session's identity and signatures.
///
/// A wallet that declines to sign returns `JournalError::Rejected`.
#[async_trait]
pub trait Signer: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    async fn sign(&self, message: &[u8]) -> JournalResult<Vec<u8>>;
}

/// Signer backed by an in-memory ed25519 keypair.
pub struct KeypairSigner {
    key: SigningKey,
}

impl KeypairSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Deterministic keypair from a 32-byte secret seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(&seed))
    }
}

impl fmt::Debug for KeypairSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeypairSigner")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Signer for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        Pubkey::new(self.key.verifying_key().to_bytes())
    }

    async fn sign(&self, message: &[u8]) -> JournalResult<Vec<u8>> {
        Ok(self.key.sign(message).to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, VerifyingKey};

    #[tokio::test]
    async fn test_keypair_signature_verifies() {
        let signer = KeypairSigner::from_seed([7u8; 32]);
        let signature = signer.sign(b"journal").await.unwrap();
        assert_eq!(signature.len(), 64);

        let key = VerifyingKey::from_bytes(signer.pubkey().as_bytes()).unwrap();
        let signature = Signature::from_slice(&signature).unwrap();
        assert!(key.verify_strict(b"journal", &signature).is_ok());
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = KeypairSigner::from_seed([7u8; 32]);
        let rendered = format!("{:?}", signer);
        assert!(rendered.starts_with("KeypairSigner"));
        assert!(!rendered.contains(&hex::encode([7u8; 32])));
    }
}
