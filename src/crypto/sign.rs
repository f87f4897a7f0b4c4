//! JWS signature primitives: HMAC, RSASSA (PKCS1 and PSS), and ECDSA.

use hmac::{
    Hmac,
    Mac,
};
use rsa::{
    RsaPrivateKey,
    RsaPublicKey,
    signature::{
        RandomizedSigner,
        SignatureEncoding,
        Signer as _,
        Verifier as _,
    },
};
use sha2::{
    Sha256,
    Sha384,
    Sha512,
};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::{
    alg::SignatureAlgorithm,
    crypto::{
        TokenSigner,
        TokenVerifier,
    },
    error::JoseError,
};

/// HMAC signer/verifier over a shared secret.
#[derive(Debug)]
pub(crate) struct MacKey {
    alg: SignatureAlgorithm,
    key: Vec<u8>,
}

impl MacKey {
    pub fn new(alg: SignatureAlgorithm, key: &[u8]) -> Result<Self, JoseError> {
        if !matches!(
            alg,
            SignatureAlgorithm::HS256 | SignatureAlgorithm::HS384 | SignatureAlgorithm::HS512
        ) || key.len() < alg.min_key_len()
        {
            return Err(JoseError::SignatureKeyNotFound);
        }
        Ok(Self {
            alg,
            key: key.to_vec(),
        })
    }

    fn tag(&self, msg: &[u8]) -> Result<Vec<u8>, JoseError> {
        macro_rules! mac {
            ($digest:ty) => {{
                let mut mac = Hmac::<$digest>::new_from_slice(&self.key)
                    .map_err(|_| JoseError::SignatureValidationFailed)?;
                mac.update(msg);
                Ok(mac.finalize().into_bytes().to_vec())
            }};
        }
        match self.alg {
            SignatureAlgorithm::HS256 => mac!(Sha256),
            SignatureAlgorithm::HS384 => mac!(Sha384),
            SignatureAlgorithm::HS512 => mac!(Sha512),
            _ => Err(JoseError::SignatureValidationFailed),
        }
    }
}

impl Drop for MacKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl TokenSigner for MacKey {
    fn sign_append(&self, msg: &[u8], out: &mut Vec<u8>) -> Result<usize, JoseError> {
        let tag = self.tag(msg)?;
        out.extend_from_slice(&tag);
        Ok(tag.len())
    }

    fn signature_len(&self) -> usize {
        self.alg.signature_len().unwrap_or(64)
    }
}

impl TokenVerifier for MacKey {
    fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        let Ok(mut expected) = self.tag(msg) else {
            return false;
        };
        let matches = expected.len() == sig.len() && bool::from(expected.ct_eq(sig));
        expected.zeroize();
        matches
    }
}

/// RSASSA signer over a private key.
#[derive(Debug)]
pub(crate) struct RsaSigningKey {
    alg: SignatureAlgorithm,
    key: RsaPrivateKey,
}

impl RsaSigningKey {
    pub fn new(alg: SignatureAlgorithm, key: RsaPrivateKey) -> Result<Self, JoseError> {
        if !is_rsa(alg) {
            return Err(JoseError::SignatureKeyNotFound);
        }
        Ok(Self { alg, key })
    }
}

impl TokenSigner for RsaSigningKey {
    fn sign_append(&self, msg: &[u8], out: &mut Vec<u8>) -> Result<usize, JoseError> {
        macro_rules! pkcs1 {
            ($digest:ty) => {{
                let sk = rsa::pkcs1v15::SigningKey::<$digest>::new(self.key.clone());
                sk.sign(msg).to_vec()
            }};
        }
        macro_rules! pss {
            ($digest:ty) => {{
                let sk = rsa::pss::BlindedSigningKey::<$digest>::new(self.key.clone());
                sk.sign_with_rng(&mut rand::rngs::OsRng, msg).to_vec()
            }};
        }
        let sig = match self.alg {
            SignatureAlgorithm::RS256 => pkcs1!(Sha256),
            SignatureAlgorithm::RS384 => pkcs1!(Sha384),
            SignatureAlgorithm::RS512 => pkcs1!(Sha512),
            SignatureAlgorithm::PS256 => pss!(Sha256),
            SignatureAlgorithm::PS384 => pss!(Sha384),
            SignatureAlgorithm::PS512 => pss!(Sha512),
            _ => return Err(JoseError::SignatureValidationFailed),
        };
        out.extend_from_slice(&sig);
        Ok(sig.len())
    }

    fn signature_len(&self) -> usize {
        use rsa::traits::PublicKeyParts;
        self.key.size()
    }
}

/// RSASSA verifier over a public key.
pub(crate) struct RsaVerifyingKey {
    alg: SignatureAlgorithm,
    key: RsaPublicKey,
}

impl RsaVerifyingKey {
    pub fn new(alg: SignatureAlgorithm, key: RsaPublicKey) -> Result<Self, JoseError> {
        if !is_rsa(alg) {
            return Err(JoseError::SignatureKeyNotFound);
        }
        Ok(Self { alg, key })
    }
}

impl TokenVerifier for RsaVerifyingKey {
    fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        macro_rules! pkcs1 {
            ($digest:ty) => {{
                let Ok(signature) = rsa::pkcs1v15::Signature::try_from(sig) else {
                    return false;
                };
                rsa::pkcs1v15::VerifyingKey::<$digest>::new(self.key.clone())
                    .verify(msg, &signature)
                    .is_ok()
            }};
        }
        macro_rules! pss {
            ($digest:ty) => {{
                let Ok(signature) = rsa::pss::Signature::try_from(sig) else {
                    return false;
                };
                rsa::pss::VerifyingKey::<$digest>::new(self.key.clone())
                    .verify(msg, &signature)
                    .is_ok()
            }};
        }
        match self.alg {
            SignatureAlgorithm::RS256 => pkcs1!(Sha256),
            SignatureAlgorithm::RS384 => pkcs1!(Sha384),
            SignatureAlgorithm::RS512 => pkcs1!(Sha512),
            SignatureAlgorithm::PS256 => pss!(Sha256),
            SignatureAlgorithm::PS384 => pss!(Sha384),
            SignatureAlgorithm::PS512 => pss!(Sha512),
            _ => false,
        }
    }
}

const fn is_rsa(alg: SignatureAlgorithm) -> bool {
    matches!(
        alg,
        SignatureAlgorithm::RS256
            | SignatureAlgorithm::RS384
            | SignatureAlgorithm::RS512
            | SignatureAlgorithm::PS256
            | SignatureAlgorithm::PS384
            | SignatureAlgorithm::PS512
    )
}

/// ECDSA signer: fixed-size `r || s` signatures per RFC 7518 §3.4.
pub(crate) enum EcSigningKey {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
}

impl std::fmt::Debug for EcSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let curve = match self {
            Self::P256(_) => "P256",
            Self::P384(_) => "P384",
            Self::P521(_) => "P521",
        };
        f.debug_tuple("EcSigningKey").field(&curve).finish()
    }
}

impl EcSigningKey {
    pub fn from_scalar(alg: SignatureAlgorithm, d: &[u8]) -> Result<Self, JoseError> {
        match alg {
            SignatureAlgorithm::ES256 => p256::ecdsa::SigningKey::from_slice(d)
                .map(Self::P256)
                .map_err(|_| JoseError::SignatureKeyNotFound),
            SignatureAlgorithm::ES384 => p384::ecdsa::SigningKey::from_slice(d)
                .map(Self::P384)
                .map_err(|_| JoseError::SignatureKeyNotFound),
            SignatureAlgorithm::ES512 => p521::ecdsa::SigningKey::from_slice(d)
                .map(Self::P521)
                .map_err(|_| JoseError::SignatureKeyNotFound),
            _ => Err(JoseError::SignatureKeyNotFound),
        }
    }
}

impl TokenSigner for EcSigningKey {
    fn sign_append(&self, msg: &[u8], out: &mut Vec<u8>) -> Result<usize, JoseError> {
        let before = out.len();
        match self {
            Self::P256(key) => {
                let sig: p256::ecdsa::Signature = key.sign(msg);
                out.extend_from_slice(&sig.to_bytes());
            }
            Self::P384(key) => {
                let sig: p384::ecdsa::Signature = key.sign(msg);
                out.extend_from_slice(&sig.to_bytes());
            }
            Self::P521(key) => {
                let sig: p521::ecdsa::Signature = key.sign(msg);
                out.extend_from_slice(&sig.to_bytes());
            }
        }
        Ok(out.len() - before)
    }

    fn signature_len(&self) -> usize {
        match self {
            Self::P256(_) => 64,
            Self::P384(_) => 96,
            Self::P521(_) => 132,
        }
    }
}

/// ECDSA verifier over an affine public point.
pub(crate) enum EcVerifyingKey {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
    P521(p521::ecdsa::VerifyingKey),
}

impl std::fmt::Debug for EcVerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let curve = match self {
            Self::P256(_) => "P256",
            Self::P384(_) => "P384",
            Self::P521(_) => "P521",
        };
        f.debug_tuple("EcVerifyingKey").field(&curve).finish()
    }
}

impl EcVerifyingKey {
    pub fn from_coordinates(
        alg: SignatureAlgorithm,
        x: &[u8],
        y: &[u8],
    ) -> Result<Self, JoseError> {
        match alg {
            SignatureAlgorithm::ES256 => {
                if x.len() != 32 || y.len() != 32 {
                    return Err(JoseError::SignatureKeyNotFound);
                }
                let point = p256::EncodedPoint::from_affine_coordinates(
                    x.into(),
                    y.into(),
                    false,
                );
                p256::ecdsa::VerifyingKey::from_encoded_point(&point)
                    .map(Self::P256)
                    .map_err(|_| JoseError::SignatureKeyNotFound)
            }
            SignatureAlgorithm::ES384 => {
                if x.len() != 48 || y.len() != 48 {
                    return Err(JoseError::SignatureKeyNotFound);
                }
                let point = p384::EncodedPoint::from_affine_coordinates(
                    x.into(),
                    y.into(),
                    false,
                );
                p384::ecdsa::VerifyingKey::from_encoded_point(&point)
                    .map(Self::P384)
                    .map_err(|_| JoseError::SignatureKeyNotFound)
            }
            SignatureAlgorithm::ES512 => {
                if x.len() != 66 || y.len() != 66 {
                    return Err(JoseError::SignatureKeyNotFound);
                }
                let point = p521::EncodedPoint::from_affine_coordinates(
                    x.into(),
                    y.into(),
                    false,
                );
                p521::ecdsa::VerifyingKey::from_encoded_point(&point)
                    .map(Self::P521)
                    .map_err(|_| JoseError::SignatureKeyNotFound)
            }
            _ => Err(JoseError::SignatureKeyNotFound),
        }
    }
}

impl TokenVerifier for EcVerifyingKey {
    fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        match self {
            Self::P256(key) => p256::ecdsa::Signature::from_slice(sig)
                .is_ok_and(|sig| key.verify(msg, &sig).is_ok()),
            Self::P384(key) => p384::ecdsa::Signature::from_slice(sig)
                .is_ok_and(|sig| key.verify(msg, &sig).is_ok()),
            Self::P521(key) => p521::ecdsa::Signature::from_slice(sig)
                .is_ok_and(|sig| key.verify(msg, &sig).is_ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hs256_sign_and_verify() {
        let key = MacKey::new(SignatureAlgorithm::HS256, &[0u8; 32]).unwrap();
        let mut sig = Vec::new();
        let written = key.sign_append(b"header.payload", &mut sig).unwrap();
        assert_eq!(written, 32);
        assert!(key.verify(b"header.payload", &sig));
        assert!(!key.verify(b"header.tampered", &sig));

        // flipped signature bit
        sig[0] ^= 1;
        assert!(!key.verify(b"header.payload", &sig));
    }

    #[test]
    fn hmac_key_below_minimum_rejected() {
        let err = MacKey::new(SignatureAlgorithm::HS256, &[0u8; 31]).unwrap_err();
        assert_eq!(err, JoseError::SignatureKeyNotFound);
        let err = MacKey::new(SignatureAlgorithm::HS512, &[0u8; 32]).unwrap_err();
        assert_eq!(err, JoseError::SignatureKeyNotFound);
    }

    #[test]
    fn hmac_key_wrong_family_rejected() {
        let err = MacKey::new(SignatureAlgorithm::RS256, &[0u8; 32]).unwrap_err();
        assert_eq!(err, JoseError::SignatureKeyNotFound);
    }

    #[test]
    fn truncated_hmac_tag_rejected() {
        let key = MacKey::new(SignatureAlgorithm::HS256, &[7u8; 32]).unwrap();
        let mut sig = Vec::new();
        key.sign_append(b"msg", &mut sig).unwrap();
        assert!(!key.verify(b"msg", &sig[..16]));
        assert!(!key.verify(b"msg", b""));
    }

    #[test]
    fn es256_sign_and_verify() {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let point = sk.verifying_key().to_encoded_point(false);

        let signer =
            EcSigningKey::from_scalar(SignatureAlgorithm::ES256, &sk.to_bytes()).unwrap();
        let verifier = EcVerifyingKey::from_coordinates(
            SignatureAlgorithm::ES256,
            point.x().unwrap(),
            point.y().unwrap(),
        )
        .unwrap();

        let mut sig = Vec::new();
        let written = signer.sign_append(b"signing-input", &mut sig).unwrap();
        assert_eq!(written, 64);
        assert!(verifier.verify(b"signing-input", &sig));

        sig[10] ^= 0x80;
        assert!(!verifier.verify(b"signing-input", &sig));
        assert!(!verifier.verify(b"signing-input", b"not-a-signature"));
    }

    #[test]
    fn ec_coordinate_length_must_match_curve() {
        let err = EcVerifyingKey::from_coordinates(SignatureAlgorithm::ES384, &[0; 32], &[0; 32])
            .unwrap_err();
        assert_eq!(err, JoseError::SignatureKeyNotFound);
    }

    #[test]
    fn rs256_sign_and_verify() {
        let sk = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        let pk = sk.to_public_key();

        let signer = RsaSigningKey::new(SignatureAlgorithm::RS256, sk).unwrap();
        let verifier = RsaVerifyingKey::new(SignatureAlgorithm::RS256, pk).unwrap();

        let mut sig = Vec::new();
        let written = signer.sign_append(b"signing-input", &mut sig).unwrap();
        assert_eq!(written, 256);
        assert!(verifier.verify(b"signing-input", &sig));

        sig[0] ^= 1;
        assert!(!verifier.verify(b"signing-input", &sig));
    }

    #[test]
    fn ps256_signatures_are_randomized_but_verify() {
        let sk = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        let pk = sk.to_public_key();

        let signer = RsaSigningKey::new(SignatureAlgorithm::PS256, sk).unwrap();
        let verifier = RsaVerifyingKey::new(SignatureAlgorithm::PS256, pk).unwrap();

        let mut first = Vec::new();
        signer.sign_append(b"msg", &mut first).unwrap();
        let mut second = Vec::new();
        signer.sign_append(b"msg", &mut second).unwrap();
        assert_ne!(first, second);
        assert!(verifier.verify(b"msg", &first));
        assert!(verifier.verify(b"msg", &second));
    }

    #[test]
    fn rsa_key_wrong_family_rejected() {
        let sk = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        let err = RsaSigningKey::new(SignatureAlgorithm::ES256, sk).unwrap_err();
        assert_eq!(err, JoseError::SignatureKeyNotFound);
    }
}
