//! Signing capability for protected payloads
//!
//! The core never touches key material directly. It asks a [`Signer`] for
//! a detached signature over the uncompressed JSON body and ships it
//! base64-encoded in the `x-pgp-signature` header.

use ed25519_dalek::{Signer as _, SigningKey, Verifier, VerifyingKey};

use crate::error::{SyncError, SyncResult};

/// Produces detached signatures over payload bytes
pub trait Signer: Send + Sync {
    /// Sign `data`, returning the raw signature bytes
    fn sign(&self, data: &[u8]) -> SyncResult<Vec<u8>>;
}

impl<F> Signer for F
where
    F: Fn(&[u8]) -> SyncResult<Vec<u8>> + Send + Sync,
{
    fn sign(&self, data: &[u8]) -> SyncResult<Vec<u8>> {
        self(data)
    }
}

/// Instance signing key backed by Ed25519
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Deterministic key from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }

    /// # Errors
    ///
    /// Returns `SyncError::Signing` unless `bytes` is exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> SyncResult<Self> {
        let seed: [u8; 32] = bytes.try_into().map_err(|_| {
            SyncError::Signing(format!("Ed25519 seed must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_seed(&seed))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Check a signature produced by this key
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&bytes);
        self.key.verifying_key().verify(data, &signature).is_ok()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, data: &[u8]) -> SyncResult<Vec<u8>> {
        Ok(self.key.sign(data).to_bytes().to_vec())
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("verifying_key", &self.key.verifying_key())
            .finish()
    }
}
