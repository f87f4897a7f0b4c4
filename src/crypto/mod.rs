//! Cryptographic primitive dispatch.
//!
//! One small capability interface per primitive family, implemented per
//! algorithm over the enumerated registries; no class hierarchy.
//! Backend errors never escape: they are mapped to
//! [`JoseError::SignatureValidationFailed`] or
//! [`JoseError::DecryptionFailed`] at this boundary.
//!
//! [`JoseError::SignatureValidationFailed`]: crate::error::JoseError::SignatureValidationFailed
//! [`JoseError::DecryptionFailed`]: crate::error::JoseError::DecryptionFailed

use zeroize::Zeroize;

use crate::error::JoseError;

pub(crate) mod compress;
pub(crate) mod content;
pub(crate) mod key_wrap;
pub(crate) mod sign;

/// Produces a JWS signature over the signing input.
pub trait TokenSigner: std::fmt::Debug {
    /// Appends the signature for `msg` to `out` and returns the number of
    /// bytes written.
    ///
    /// # Errors
    ///
    /// [`JoseError::SignatureValidationFailed`] when the backend cannot
    /// produce a signature with this key.
    fn sign_append(&self, msg: &[u8], out: &mut Vec<u8>) -> Result<usize, JoseError>;

    /// Upper bound on the signature size in bytes, for preallocation.
    fn signature_len(&self) -> usize;
}

/// Verifies a JWS signature. Tag comparisons are constant-time.
pub trait TokenVerifier {
    /// Returns `true` only when `sig` is a valid signature over `msg`.
    /// Never panics on malformed signatures.
    fn verify(&self, msg: &[u8], sig: &[u8]) -> bool;
}

/// A content-encryption key or derived secret, overwritten on release.
pub struct CekMaterial(Vec<u8>);

impl CekMaterial {
    #[must_use]
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Fresh random CEK of `len` bytes from the OS CSPRNG.
    pub(crate) fn random(len: usize) -> Self {
        use rand::RngCore;
        let mut bytes = vec![0u8; len];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    #[must_use]
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

impl Drop for CekMaterial {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for CekMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        f.debug_struct("CekMaterial").field("len", &self.0.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_cek_has_requested_length() {
        let cek = CekMaterial::random(32);
        assert_eq!(cek.len(), 32);
        assert_ne!(cek.bytes(), [0u8; 32]);
    }

    #[test]
    fn debug_does_not_leak() {
        let cek = CekMaterial::new(b"super-secret".to_vec());
        let rendered = format!("{cek:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
