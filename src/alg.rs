//! Canonical algorithm registries for signature, key management, content
//! encryption, and compression.
//!
//! Each registry is a closed enumeration; lookup is by exact UTF-8 name
//! bytes and unknown names fail validation rather than falling back.

use std::fmt::Display;

/// JWS signature algorithm.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum SignatureAlgorithm {
    /// `HMAC` using `SHA-256`
    #[default]
    HS256,

    /// `HMAC` using `SHA-384`
    HS384,

    /// `HMAC` using `SHA-512`
    HS512,

    /// `RSASSA-PKCS1-v1_5` using `SHA-256`
    RS256,

    /// `RSASSA-PKCS1-v1_5` using `SHA-384`
    RS384,

    /// `RSASSA-PKCS1-v1_5` using `SHA-512`
    RS512,

    /// `RSASSA-PSS` using `SHA-256` and MGF1 with `SHA-256`
    PS256,

    /// `RSASSA-PSS` using `SHA-384` and MGF1 with `SHA-384`
    PS384,

    /// `RSASSA-PSS` using `SHA-512` and MGF1 with `SHA-512`
    PS512,

    /// `ECDSA` using `P-256` and `SHA-256`
    ES256,

    /// `ECDSA` using `P-384` and `SHA-384`
    ES384,

    /// `ECDSA` using `P-521` and `SHA-512`
    ES512,

    /// Unsecured JWS. Rejected by readers unless the policy opts in.
    #[serde(rename = "none")]
    None,
}

impl SignatureAlgorithm {
    pub const ALL: [Self; 13] = [
        Self::HS256,
        Self::HS384,
        Self::HS512,
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::PS256,
        Self::PS384,
        Self::PS512,
        Self::ES256,
        Self::ES384,
        Self::ES512,
        Self::None,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
            Self::None => "none",
        }
    }

    /// Exact-match lookup over raw name bytes.
    #[must_use]
    pub fn from_name(name: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.name().as_bytes() == name)
    }

    /// Minimum acceptable key length in bytes (HMAC per RFC 7518 §3.2;
    /// zero for asymmetric families where the key object enforces size).
    #[must_use]
    pub const fn min_key_len(self) -> usize {
        match self {
            Self::HS256 => 32,
            Self::HS384 => 48,
            Self::HS512 => 64,
            _ => 0,
        }
    }

    /// Fixed signature length in bytes, where the algorithm defines one.
    #[must_use]
    pub const fn signature_len(self) -> Option<usize> {
        match self {
            Self::HS256 => Some(32),
            Self::HS384 => Some(48),
            Self::HS512 => Some(64),
            Self::ES256 => Some(64),
            Self::ES384 => Some(96),
            Self::ES512 => Some(132),
            Self::None => Some(0),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_unsecured(self) -> bool {
        matches!(self, Self::None)
    }
}

impl Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// JWE key-management algorithm: how the content encryption key is
/// transported, wrapped, or agreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum KeyManagementAlgorithm {
    /// The shared symmetric key is the CEK.
    #[serde(rename = "dir")]
    Dir,

    /// AES-128 Key Wrap (RFC 3394)
    #[serde(rename = "A128KW")]
    A128Kw,

    /// AES-192 Key Wrap (RFC 3394)
    #[serde(rename = "A192KW")]
    A192Kw,

    /// AES-256 Key Wrap (RFC 3394)
    #[serde(rename = "A256KW")]
    A256Kw,

    /// AES-128 GCM key encryption; `iv` and `tag` travel in the header
    #[serde(rename = "A128GCMKW")]
    A128GcmKw,

    /// AES-192 GCM key encryption
    #[serde(rename = "A192GCMKW")]
    A192GcmKw,

    /// AES-256 GCM key encryption
    #[serde(rename = "A256GCMKW")]
    A256GcmKw,

    /// RSAES-PKCS1-v1_5 key transport
    #[serde(rename = "RSA1_5")]
    Rsa1_5,

    /// RSAES-OAEP with SHA-1
    #[serde(rename = "RSA-OAEP")]
    RsaOaep,

    /// RSAES-OAEP with SHA-256
    #[serde(rename = "RSA-OAEP-256")]
    RsaOaep256,

    /// RSAES-OAEP with SHA-384
    #[serde(rename = "RSA-OAEP-384")]
    RsaOaep384,

    /// RSAES-OAEP with SHA-512
    #[serde(rename = "RSA-OAEP-512")]
    RsaOaep512,

    /// ECDH-ES direct key agreement via Concat KDF
    #[serde(rename = "ECDH-ES")]
    EcdhEs,

    /// ECDH-ES agreement, derived key wraps the CEK with A128KW
    #[serde(rename = "ECDH-ES+A128KW")]
    EcdhEsA128Kw,

    /// ECDH-ES agreement, derived key wraps the CEK with A192KW
    #[serde(rename = "ECDH-ES+A192KW")]
    EcdhEsA192Kw,

    /// ECDH-ES agreement, derived key wraps the CEK with A256KW
    #[serde(rename = "ECDH-ES+A256KW")]
    EcdhEsA256Kw,

    /// PBES2 with HMAC-SHA-256 and A128KW
    #[serde(rename = "PBES2-HS256+A128KW")]
    Pbes2Hs256A128Kw,

    /// PBES2 with HMAC-SHA-384 and A192KW
    #[serde(rename = "PBES2-HS384+A192KW")]
    Pbes2Hs384A192Kw,

    /// PBES2 with HMAC-SHA-512 and A256KW
    #[serde(rename = "PBES2-HS512+A256KW")]
    Pbes2Hs512A256Kw,
}

impl KeyManagementAlgorithm {
    pub const ALL: [Self; 19] = [
        Self::Dir,
        Self::A128Kw,
        Self::A192Kw,
        Self::A256Kw,
        Self::A128GcmKw,
        Self::A192GcmKw,
        Self::A256GcmKw,
        Self::Rsa1_5,
        Self::RsaOaep,
        Self::RsaOaep256,
        Self::RsaOaep384,
        Self::RsaOaep512,
        Self::EcdhEs,
        Self::EcdhEsA128Kw,
        Self::EcdhEsA192Kw,
        Self::EcdhEsA256Kw,
        Self::Pbes2Hs256A128Kw,
        Self::Pbes2Hs384A192Kw,
        Self::Pbes2Hs512A256Kw,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::A128Kw => "A128KW",
            Self::A192Kw => "A192KW",
            Self::A256Kw => "A256KW",
            Self::A128GcmKw => "A128GCMKW",
            Self::A192GcmKw => "A192GCMKW",
            Self::A256GcmKw => "A256GCMKW",
            Self::Rsa1_5 => "RSA1_5",
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaOaep256 => "RSA-OAEP-256",
            Self::RsaOaep384 => "RSA-OAEP-384",
            Self::RsaOaep512 => "RSA-OAEP-512",
            Self::EcdhEs => "ECDH-ES",
            Self::EcdhEsA128Kw => "ECDH-ES+A128KW",
            Self::EcdhEsA192Kw => "ECDH-ES+A192KW",
            Self::EcdhEsA256Kw => "ECDH-ES+A256KW",
            Self::Pbes2Hs256A128Kw => "PBES2-HS256+A128KW",
            Self::Pbes2Hs384A192Kw => "PBES2-HS384+A192KW",
            Self::Pbes2Hs512A256Kw => "PBES2-HS512+A256KW",
        }
    }

    /// Exact-match lookup over raw name bytes.
    #[must_use]
    pub fn from_name(name: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.name().as_bytes() == name)
    }

    /// True when no encrypted-key segment is transported: the CEK is the
    /// key itself (`dir`) or the agreed secret (`ECDH-ES`).
    #[must_use]
    pub const fn is_direct(self) -> bool {
        matches!(self, Self::Dir | Self::EcdhEs)
    }

    /// Key-wrap (KEK) size in bytes for the AES-based modes.
    #[must_use]
    pub const fn kek_len(self) -> Option<usize> {
        match self {
            Self::A128Kw | Self::A128GcmKw | Self::EcdhEsA128Kw | Self::Pbes2Hs256A128Kw => {
                Some(16)
            }
            Self::A192Kw | Self::A192GcmKw | Self::EcdhEsA192Kw | Self::Pbes2Hs384A192Kw => {
                Some(24)
            }
            Self::A256Kw | Self::A256GcmKw | Self::EcdhEsA256Kw | Self::Pbes2Hs512A256Kw => {
                Some(32)
            }
            _ => None,
        }
    }
}

impl Display for KeyManagementAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// JWE content-encryption algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EncryptionAlgorithm {
    /// AES-128-CBC with HMAC-SHA-256 (RFC 7518 §5.2.3)
    #[serde(rename = "A128CBC-HS256")]
    A128CbcHs256,

    /// AES-192-CBC with HMAC-SHA-384
    #[serde(rename = "A192CBC-HS384")]
    A192CbcHs384,

    /// AES-256-CBC with HMAC-SHA-512
    #[serde(rename = "A256CBC-HS512")]
    A256CbcHs512,

    /// AES-128-GCM
    #[serde(rename = "A128GCM")]
    A128Gcm,

    /// AES-192-GCM
    #[serde(rename = "A192GCM")]
    A192Gcm,

    /// AES-256-GCM
    #[serde(rename = "A256GCM")]
    A256Gcm,
}

impl EncryptionAlgorithm {
    pub const ALL: [Self; 6] = [
        Self::A128CbcHs256,
        Self::A192CbcHs384,
        Self::A256CbcHs512,
        Self::A128Gcm,
        Self::A192Gcm,
        Self::A256Gcm,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A192CbcHs384 => "A192CBC-HS384",
            Self::A256CbcHs512 => "A256CBC-HS512",
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    /// Exact-match lookup over raw name bytes.
    #[must_use]
    pub fn from_name(name: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.name().as_bytes() == name)
    }

    /// CEK length in bytes. CBC-HMAC composites take a double-length key
    /// (MAC half plus encryption half).
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::A128CbcHs256 => 32,
            Self::A192CbcHs384 => 48,
            Self::A256CbcHs512 => 64,
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
            Self::A256Gcm => 32,
        }
    }

    /// Nonce length in bytes: one AES block for CBC, 96 bits for GCM.
    #[must_use]
    pub const fn iv_len(self) -> usize {
        match self {
            Self::A128CbcHs256 | Self::A192CbcHs384 | Self::A256CbcHs512 => 16,
            Self::A128Gcm | Self::A192Gcm | Self::A256Gcm => 12,
        }
    }

    /// Authentication-tag length in bytes.
    #[must_use]
    pub const fn tag_len(self) -> usize {
        match self {
            Self::A128CbcHs256 => 16,
            Self::A192CbcHs384 => 24,
            Self::A256CbcHs512 => 32,
            Self::A128Gcm | Self::A192Gcm | Self::A256Gcm => 16,
        }
    }
}

impl Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// JWE payload compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CompressionAlgorithm {
    /// Raw DEFLATE (RFC 1951, no zlib wrapper)
    #[serde(rename = "DEF")]
    Def,
}

impl CompressionAlgorithm {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Def => "DEF",
        }
    }

    /// Exact-match lookup over raw name bytes.
    #[must_use]
    pub fn from_name(name: &[u8]) -> Option<Self> {
        if name == b"DEF" { Some(Self::Def) } else { None }
    }
}

impl Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
