//! JSON Web Key model.
//!
//! A [`Jwk`] is one of four material variants (symmetric, RSA, EC,
//! password) plus the usual selection attributes (`kid`, `use`, `alg`,
//! `key_ops`). Capability checks happen before any cryptographic
//! operation is attempted: a key advertises which algorithms it supports
//! and callers query that instead of trying and failing.

use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use zeroize::Zeroize;

use crate::{
    alg::{
        EncryptionAlgorithm,
        KeyManagementAlgorithm,
        SignatureAlgorithm,
    },
    b64,
    crypto::{
        TokenSigner,
        TokenVerifier,
        sign::{
            EcSigningKey,
            EcVerifyingKey,
            MacKey,
            RsaSigningKey,
            RsaVerifyingKey,
        },
    },
    error::JoseError,
    json::ObjectWriter,
};

/// `use` attribute: what class of operation the key is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUse {
    Sig,
    Enc,
}

/// Named elliptic curve for `kty: EC` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    #[must_use]
    pub const fn crv_name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    #[must_use]
    pub fn from_crv_name(name: &str) -> Option<Self> {
        match name {
            "P-256" => Some(Self::P256),
            "P-384" => Some(Self::P384),
            "P-521" => Some(Self::P521),
            _ => None,
        }
    }

    /// Field-element length in bytes.
    #[must_use]
    pub const fn coordinate_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    pub(crate) const fn signature_algorithm(self) -> SignatureAlgorithm {
        match self {
            Self::P256 => SignatureAlgorithm::ES256,
            Self::P384 => SignatureAlgorithm::ES384,
            Self::P521 => SignatureAlgorithm::ES512,
        }
    }
}

#[derive(Clone)]
pub(crate) enum KeyMaterial {
    Symmetric {
        k: Vec<u8>,
    },
    Rsa {
        n: Vec<u8>,
        e: Vec<u8>,
        d: Option<Vec<u8>>,
        p: Option<Vec<u8>>,
        q: Option<Vec<u8>>,
    },
    Ec {
        curve: EcCurve,
        x: Vec<u8>,
        y: Vec<u8>,
        d: Option<Vec<u8>>,
    },
    Password {
        secret: Vec<u8>,
    },
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        match self {
            Self::Symmetric { k } => k.zeroize(),
            Self::Rsa { d, p, q, .. } => {
                for secret in [d, p, q].into_iter().flatten() {
                    secret.zeroize();
                }
            }
            Self::Ec { d, .. } => {
                if let Some(d) = d {
                    d.zeroize();
                }
            }
            Self::Password { secret } => secret.zeroize(),
        }
    }
}

/// A JSON Web Key. Immutable after construction.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "RawJwk", into = "RawJwk")]
pub struct Jwk {
    kid: Option<String>,
    use_: Option<KeyUse>,
    alg: Option<String>,
    key_ops: Option<Vec<String>>,
    material: KeyMaterial,
}

impl std::fmt::Debug for Jwk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // key material never appears in debug output
        f.debug_struct("Jwk")
            .field("kty", &self.kty_name())
            .field("kid", &self.kid)
            .finish()
    }
}

impl Jwk {
    fn new(material: KeyMaterial) -> Self {
        Self {
            kid: None,
            use_: None,
            alg: None,
            key_ops: None,
            material,
        }
    }

    /// A symmetric (`oct`) key over raw bytes.
    #[must_use]
    pub fn from_symmetric(k: &[u8]) -> Self {
        Self::new(KeyMaterial::Symmetric { k: k.to_vec() })
    }

    /// A password key for the PBES2 family.
    #[must_use]
    pub fn from_password(secret: &[u8]) -> Self {
        Self::new(KeyMaterial::Password {
            secret: secret.to_vec(),
        })
    }

    /// An RSA key from big-endian component bytes. Pass `d` (and ideally
    /// `p`/`q`) for a private key, `None` for public-only.
    #[must_use]
    pub fn from_rsa_components(
        n: &[u8],
        e: &[u8],
        d: Option<&[u8]>,
        p: Option<&[u8]>,
        q: Option<&[u8]>,
    ) -> Self {
        Self::new(KeyMaterial::Rsa {
            n: n.to_vec(),
            e: e.to_vec(),
            d: d.map(<[u8]>::to_vec),
            p: p.map(<[u8]>::to_vec),
            q: q.map(<[u8]>::to_vec),
        })
    }

    /// An EC key from affine coordinates. Pass the scalar `d` for a
    /// private key.
    ///
    /// # Errors
    ///
    /// [`JoseError::InvalidHeader`] when a component length does not
    /// match the curve.
    pub fn from_ec_components(
        curve: EcCurve,
        x: &[u8],
        y: &[u8],
        d: Option<&[u8]>,
    ) -> Result<Self, JoseError> {
        let len = curve.coordinate_len();
        if x.len() != len || y.len() != len || d.is_some_and(|d| d.len() != len) {
            return Err(JoseError::InvalidHeader("epk"));
        }
        Ok(Self::new(KeyMaterial::Ec {
            curve,
            x: x.to_vec(),
            y: y.to_vec(),
            d: d.map(<[u8]>::to_vec),
        }))
    }

    /// Parses a single JWK document.
    ///
    /// # Errors
    ///
    /// [`JoseError::MalformedToken`] when the JSON or any base64url
    /// component is invalid.
    pub fn from_json(json: &str) -> Result<Self, JoseError> {
        serde_json::from_str(json).map_err(|_| JoseError::MalformedToken)
    }

    /// Serializes to a JWK document.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(&RawJwk::from(self.clone())).unwrap_or_default()
    }

    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    #[must_use]
    pub fn with_use(mut self, key_use: KeyUse) -> Self {
        self.use_ = Some(key_use);
        self
    }

    #[must_use]
    pub fn with_alg(mut self, alg: impl Into<String>) -> Self {
        self.alg = Some(alg.into());
        self
    }

    #[must_use]
    pub fn with_key_ops(mut self, ops: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.key_ops = Some(ops.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    #[must_use]
    pub fn key_use(&self) -> Option<KeyUse> {
        self.use_
    }

    #[must_use]
    pub fn alg(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    fn kty_name(&self) -> &'static str {
        match &self.material {
            KeyMaterial::Symmetric { .. } => "oct",
            KeyMaterial::Rsa { .. } => "RSA",
            KeyMaterial::Ec { .. } => "EC",
            KeyMaterial::Password { .. } => "oct",
        }
    }

    fn allows(&self, needed: KeyUse, alg_name: &str, ops: &[&str]) -> bool {
        if self.use_.is_some_and(|u| u != needed) {
            return false;
        }
        if self.alg.as_deref().is_some_and(|a| a != alg_name) {
            return false;
        }
        if let Some(key_ops) = &self.key_ops {
            return ops.iter().any(|op| key_ops.iter().any(|k| k == op));
        }
        true
    }

    /// Whether this key can sign or verify with `alg`.
    #[must_use]
    pub fn supports_signature(&self, alg: SignatureAlgorithm) -> bool {
        if alg.is_unsecured() {
            return false;
        }
        if !self.allows(KeyUse::Sig, alg.name(), &["sign", "verify"]) {
            return false;
        }
        match (&self.material, alg) {
            (
                KeyMaterial::Symmetric { k },
                SignatureAlgorithm::HS256 | SignatureAlgorithm::HS384 | SignatureAlgorithm::HS512,
            ) => k.len() >= alg.min_key_len(),
            (
                KeyMaterial::Rsa { .. },
                SignatureAlgorithm::RS256
                | SignatureAlgorithm::RS384
                | SignatureAlgorithm::RS512
                | SignatureAlgorithm::PS256
                | SignatureAlgorithm::PS384
                | SignatureAlgorithm::PS512,
            ) => true,
            (KeyMaterial::Ec { curve, .. }, _) => curve.signature_algorithm() == alg,
            _ => false,
        }
    }

    /// Whether this key can wrap or unwrap a CEK with `alg` for content
    /// encryption `enc`.
    #[must_use]
    pub fn supports_key_management(
        &self,
        alg: KeyManagementAlgorithm,
        enc: EncryptionAlgorithm,
    ) -> bool {
        use KeyManagementAlgorithm as Kma;
        if !self.allows(KeyUse::Enc, alg.name(), &["wrapKey", "unwrapKey", "deriveKey", "encrypt", "decrypt"]) {
            return false;
        }
        match (&self.material, alg) {
            (KeyMaterial::Symmetric { k }, Kma::Dir) => k.len() == enc.key_len(),
            (
                KeyMaterial::Symmetric { k },
                Kma::A128Kw
                | Kma::A192Kw
                | Kma::A256Kw
                | Kma::A128GcmKw
                | Kma::A192GcmKw
                | Kma::A256GcmKw,
            ) => Some(k.len()) == alg.kek_len(),
            (
                KeyMaterial::Rsa { .. },
                Kma::Rsa1_5
                | Kma::RsaOaep
                | Kma::RsaOaep256
                | Kma::RsaOaep384
                | Kma::RsaOaep512,
            ) => true,
            (
                KeyMaterial::Ec { .. },
                Kma::EcdhEs | Kma::EcdhEsA128Kw | Kma::EcdhEsA192Kw | Kma::EcdhEsA256Kw,
            ) => true,
            (
                KeyMaterial::Password { .. },
                Kma::Pbes2Hs256A128Kw | Kma::Pbes2Hs384A192Kw | Kma::Pbes2Hs512A256Kw,
            ) => true,
            _ => false,
        }
    }

    /// Builds a signer for `alg`.
    ///
    /// # Errors
    ///
    /// [`JoseError::SignatureKeyNotFound`] when the key material cannot
    /// sign with `alg` (wrong family, missing private part, short key).
    pub fn create_signer(&self, alg: SignatureAlgorithm) -> Result<Box<dyn TokenSigner>, JoseError> {
        match &self.material {
            KeyMaterial::Symmetric { k } => Ok(Box::new(MacKey::new(alg, k)?)),
            KeyMaterial::Rsa { .. } => {
                let key = self.rsa_private_key().ok_or(JoseError::SignatureKeyNotFound)?;
                Ok(Box::new(RsaSigningKey::new(alg, key)?))
            }
            KeyMaterial::Ec { d, .. } => {
                let d = d.as_deref().ok_or(JoseError::SignatureKeyNotFound)?;
                Ok(Box::new(EcSigningKey::from_scalar(alg, d)?))
            }
            KeyMaterial::Password { .. } => Err(JoseError::SignatureKeyNotFound),
        }
    }

    /// Builds a verifier for `alg`.
    ///
    /// # Errors
    ///
    /// [`JoseError::SignatureKeyNotFound`] when the key material cannot
    /// verify with `alg`.
    pub fn create_verifier(
        &self,
        alg: SignatureAlgorithm,
    ) -> Result<Box<dyn TokenVerifier>, JoseError> {
        match &self.material {
            KeyMaterial::Symmetric { k } => Ok(Box::new(MacKey::new(alg, k)?)),
            KeyMaterial::Rsa { .. } => {
                let key = self.rsa_public_key().ok_or(JoseError::SignatureKeyNotFound)?;
                Ok(Box::new(RsaVerifyingKey::new(alg, key)?))
            }
            KeyMaterial::Ec { x, y, .. } => {
                Ok(Box::new(EcVerifyingKey::from_coordinates(alg, x, y)?))
            }
            KeyMaterial::Password { .. } => Err(JoseError::SignatureKeyNotFound),
        }
    }

    /// RFC 7638 thumbprint: base64url of SHA-256 over the canonical
    /// required-member JSON.
    #[must_use]
    pub fn thumbprint(&self) -> String {
        let mut canonical = Vec::with_capacity(128);
        let mut writer = ObjectWriter::begin(&mut canonical);
        match &self.material {
            KeyMaterial::Ec { curve, x, y, .. } => {
                writer.member_str("crv", curve.crv_name());
                writer.member_str("kty", "EC");
                writer.member_str("x", &b64::encode_string(x));
                writer.member_str("y", &b64::encode_string(y));
            }
            KeyMaterial::Rsa { n, e, .. } => {
                writer.member_str("e", &b64::encode_string(e));
                writer.member_str("kty", "RSA");
                writer.member_str("n", &b64::encode_string(n));
            }
            KeyMaterial::Symmetric { k } => {
                writer.member_str("k", &b64::encode_string(k));
                writer.member_str("kty", "oct");
            }
            KeyMaterial::Password { secret } => {
                writer.member_str("k", &b64::encode_string(secret));
                writer.member_str("kty", "oct");
            }
        }
        writer.finish();
        b64::encode_string(Sha256::digest(&canonical))
    }

    pub(crate) fn symmetric_key(&self) -> Option<&[u8]> {
        match &self.material {
            KeyMaterial::Symmetric { k } => Some(k),
            _ => None,
        }
    }

    pub(crate) fn password(&self) -> Option<&[u8]> {
        match &self.material {
            KeyMaterial::Password { secret } => Some(secret),
            _ => None,
        }
    }

    pub(crate) fn rsa_public_key(&self) -> Option<rsa::RsaPublicKey> {
        match &self.material {
            KeyMaterial::Rsa { n, e, .. } => rsa::RsaPublicKey::new(
                rsa::BigUint::from_bytes_be(n),
                rsa::BigUint::from_bytes_be(e),
            )
            .ok(),
            _ => None,
        }
    }

    pub(crate) fn rsa_private_key(&self) -> Option<rsa::RsaPrivateKey> {
        match &self.material {
            KeyMaterial::Rsa { n, e, d, p, q } => {
                let d = d.as_ref()?;
                let primes = match (p, q) {
                    (Some(p), Some(q)) => vec![
                        rsa::BigUint::from_bytes_be(p),
                        rsa::BigUint::from_bytes_be(q),
                    ],
                    _ => Vec::new(),
                };
                rsa::RsaPrivateKey::from_components(
                    rsa::BigUint::from_bytes_be(n),
                    rsa::BigUint::from_bytes_be(e),
                    rsa::BigUint::from_bytes_be(d),
                    primes,
                )
                .ok()
            }
            _ => None,
        }
    }

    pub(crate) fn ec_curve(&self) -> Option<EcCurve> {
        match &self.material {
            KeyMaterial::Ec { curve, .. } => Some(*curve),
            _ => None,
        }
    }

    pub(crate) fn ec_public_coordinates(&self) -> Option<(&[u8], &[u8])> {
        match &self.material {
            KeyMaterial::Ec { x, y, .. } => Some((x, y)),
            _ => None,
        }
    }

    pub(crate) fn ec_private_scalar(&self) -> Option<&[u8]> {
        match &self.material {
            KeyMaterial::Ec { d, .. } => d.as_deref(),
            _ => None,
        }
    }
}

/// A JWK Set document (`{"keys":[...]}`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Parses a JWK Set document.
    ///
    /// # Errors
    ///
    /// [`JoseError::MalformedToken`] when the JSON or any member key is
    /// invalid.
    pub fn from_json(json: &str) -> Result<Self, JoseError> {
        serde_json::from_str(json).map_err(|_| JoseError::MalformedToken)
    }
}

/// Wire shape of a JWK: optional base64url members, validated on
/// conversion into [`Jwk`].
#[derive(Serialize, Deserialize)]
struct RawJwk {
    kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    use_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_ops: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    k: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    d: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    p: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    y: Option<String>,
}

impl TryFrom<RawJwk> for Jwk {
    type Error = JoseError;

    fn try_from(raw: RawJwk) -> Result<Self, JoseError> {
        fn decode(field: &Option<String>) -> Result<Option<Vec<u8>>, JoseError> {
            field.as_deref().map(b64::decode_vec).transpose()
        }

        let material = match raw.kty.as_str() {
            "oct" => KeyMaterial::Symmetric {
                k: decode(&raw.k)?.ok_or(JoseError::MalformedToken)?,
            },
            "RSA" => KeyMaterial::Rsa {
                n: decode(&raw.n)?.ok_or(JoseError::MalformedToken)?,
                e: decode(&raw.e)?.ok_or(JoseError::MalformedToken)?,
                d: decode(&raw.d)?,
                p: decode(&raw.p)?,
                q: decode(&raw.q)?,
            },
            "EC" => {
                let curve = raw
                    .crv
                    .as_deref()
                    .and_then(EcCurve::from_crv_name)
                    .ok_or(JoseError::MalformedToken)?;
                let x = decode(&raw.x)?.ok_or(JoseError::MalformedToken)?;
                let y = decode(&raw.y)?.ok_or(JoseError::MalformedToken)?;
                let d = decode(&raw.d)?;
                let len = curve.coordinate_len();
                if x.len() != len || y.len() != len || d.as_ref().is_some_and(|d| d.len() != len)
                {
                    return Err(JoseError::MalformedToken);
                }
                KeyMaterial::Ec { curve, x, y, d }
            }
            _ => return Err(JoseError::MalformedToken),
        };

        let use_ = match raw.use_.as_deref() {
            None => None,
            Some("sig") => Some(KeyUse::Sig),
            Some("enc") => Some(KeyUse::Enc),
            Some(_) => return Err(JoseError::MalformedToken),
        };

        Ok(Self {
            kid: raw.kid,
            use_,
            alg: raw.alg,
            key_ops: raw.key_ops,
            material,
        })
    }
}

impl From<Jwk> for RawJwk {
    fn from(key: Jwk) -> Self {
        let mut raw = Self {
            kty: key.kty_name().to_owned(),
            kid: key.kid.clone(),
            use_: key.use_.map(|u| {
                match u {
                    KeyUse::Sig => "sig",
                    KeyUse::Enc => "enc",
                }
                .to_owned()
            }),
            alg: key.alg.clone(),
            key_ops: key.key_ops.clone(),
            k: None,
            n: None,
            e: None,
            d: None,
            p: None,
            q: None,
            crv: None,
            x: None,
            y: None,
        };
        match &key.material {
            KeyMaterial::Symmetric { k } => raw.k = Some(b64::encode_string(k)),
            KeyMaterial::Password { secret } => raw.k = Some(b64::encode_string(secret)),
            KeyMaterial::Rsa { n, e, d, p, q } => {
                raw.n = Some(b64::encode_string(n));
                raw.e = Some(b64::encode_string(e));
                raw.d = d.as_ref().map(b64::encode_string);
                raw.p = p.as_ref().map(b64::encode_string);
                raw.q = q.as_ref().map(b64::encode_string);
            }
            KeyMaterial::Ec { curve, x, y, d } => {
                raw.crv = Some(curve.crv_name().to_owned());
                raw.x = Some(b64::encode_string(x));
                raw.y = Some(b64::encode_string(y));
                raw.d = d.as_ref().map(b64::encode_string);
            }
        }
        raw
    }
}
