//! Parsed JOSE header.
//!
//! A header owns its decoded JSON bytes plus the node index over them;
//! registered members are resolved once at parse time, everything else is
//! sliced on demand. Duplicate members resolve to the last occurrence on
//! both the read and write paths.

use std::borrow::Cow;

use crate::{
    alg::{
        CompressionAlgorithm,
        EncryptionAlgorithm,
        KeyManagementAlgorithm,
        SignatureAlgorithm,
    },
    error::JoseError,
    json::{
        JsonIndex,
        JsonKind,
    },
};

/// A parsed header over its own decoded JSON buffer.
#[derive(Debug)]
pub struct JwtHeader {
    raw: Box<[u8]>,
    index: JsonIndex,
}

impl JwtHeader {
    /// Parses decoded header JSON. The root must be an object.
    ///
    /// # Errors
    ///
    /// [`JoseError::MalformedToken`] when `raw` is not a JSON object, or
    /// [`JoseError::InvalidHeader`] when a registered member has the
    /// wrong JSON shape.
    pub fn parse(raw: Vec<u8>) -> Result<Self, JoseError> {
        let index = JsonIndex::parse(&raw)?;
        if index.kind(index.root()) != JsonKind::Object {
            return Err(JoseError::MalformedToken);
        }
        let header = Self {
            raw: raw.into_boxed_slice(),
            index,
        };
        // registered string members must be strings when present
        for name in ["alg", "enc", "zip", "kid", "typ", "cty"] {
            if let Some(node) = header.member(name) {
                if header.index.kind(node) != JsonKind::String {
                    return Err(JoseError::InvalidHeader(registered_name(name)));
                }
            }
        }
        if let Some(crit) = header.member("crit") {
            if header.index.kind(crit) != JsonKind::Array {
                return Err(JoseError::InvalidHeader("crit"));
            }
            for item in header.index.items(crit) {
                if header.index.kind(item) != JsonKind::String {
                    return Err(JoseError::InvalidHeader("crit"));
                }
            }
        }
        Ok(header)
    }

    /// The exact decoded header JSON bytes.
    #[must_use]
    pub fn raw_json(&self) -> &[u8] {
        &self.raw
    }

    fn member(&self, name: &str) -> Option<u32> {
        self.index.member(&self.raw, self.index.root(), name.as_bytes())
    }

    fn str_member(&self, name: &str) -> Option<Cow<'_, str>> {
        self.index.str_value(&self.raw, self.member(name)?)
    }

    /// Raw `alg` name bytes, if present.
    #[must_use]
    pub fn alg_name(&self) -> Option<&[u8]> {
        self.member("alg").map(|node| self.index.raw(&self.raw, node))
    }

    /// `alg` resolved against the signature registry.
    ///
    /// # Errors
    ///
    /// [`JoseError::InvalidHeader`] when `alg` is absent or unknown.
    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm, JoseError> {
        self.alg_name()
            .and_then(SignatureAlgorithm::from_name)
            .ok_or(JoseError::InvalidHeader("alg"))
    }

    /// `alg` resolved against the key-management registry.
    ///
    /// # Errors
    ///
    /// [`JoseError::InvalidHeader`] when `alg` is absent or unknown.
    pub fn key_management_algorithm(&self) -> Result<KeyManagementAlgorithm, JoseError> {
        self.alg_name()
            .and_then(KeyManagementAlgorithm::from_name)
            .ok_or(JoseError::InvalidHeader("alg"))
    }

    /// `enc` resolved against the content-encryption registry.
    ///
    /// # Errors
    ///
    /// [`JoseError::MissingEncryptionAlgorithm`] when absent,
    /// [`JoseError::InvalidHeader`] when unknown.
    pub fn encryption_algorithm(&self) -> Result<EncryptionAlgorithm, JoseError> {
        let node = self
            .member("enc")
            .ok_or(JoseError::MissingEncryptionAlgorithm)?;
        EncryptionAlgorithm::from_name(self.index.raw(&self.raw, node))
            .ok_or(JoseError::InvalidHeader("enc"))
    }

    /// `zip`, when present.
    ///
    /// # Errors
    ///
    /// [`JoseError::InvalidHeader`] when present but unknown.
    pub fn compression(&self) -> Result<Option<CompressionAlgorithm>, JoseError> {
        match self.member("zip") {
            None => Ok(None),
            Some(node) => CompressionAlgorithm::from_name(self.index.raw(&self.raw, node))
                .map(Some)
                .ok_or(JoseError::InvalidHeader("zip")),
        }
    }

    #[must_use]
    pub fn kid(&self) -> Option<Cow<'_, str>> {
        self.str_member("kid")
    }

    #[must_use]
    pub fn typ(&self) -> Option<Cow<'_, str>> {
        self.str_member("typ")
    }

    #[must_use]
    pub fn cty(&self) -> Option<Cow<'_, str>> {
        self.str_member("cty")
    }

    /// True when `cty` marks a nested compact JWT (ASCII case-insensitive
    /// per RFC 7519 §5.2).
    #[must_use]
    pub fn carries_nested_token(&self) -> bool {
        self.cty().is_some_and(|cty| cty.eq_ignore_ascii_case("JWT"))
    }

    #[must_use]
    pub fn has_member(&self, name: &str) -> bool {
        self.member(name).is_some()
    }

    /// Names listed in `crit`, unescaped.
    pub fn crit(&self) -> impl Iterator<Item = Cow<'_, str>> {
        let crit = self.member("crit");
        crit.into_iter().flat_map(move |node| {
            self.index
                .items(node)
                .filter_map(|item| self.index.str_value(&self.raw, item))
        })
    }

    /// Raw JSON text of an arbitrary member value (quotes included for
    /// strings). This is what critical-header handlers see.
    #[must_use]
    pub fn member_raw_value(&self, name: &str) -> Option<&[u8]> {
        self.member(name)
            .map(|node| self.index.raw_value(&self.raw, node))
    }

    /// String value of an arbitrary member (`p2s`, `apu`, …).
    #[must_use]
    pub fn member_str(&self, name: &str) -> Option<Cow<'_, str>> {
        self.str_member(name)
    }

    /// Integer value of an arbitrary member (`p2c`).
    #[must_use]
    pub fn member_i64(&self, name: &str) -> Option<i64> {
        self.index.i64_value(&self.raw, self.member(name)?)
    }
}

fn registered_name(name: &str) -> &'static str {
    match name {
        "alg" => "alg",
        "enc" => "enc",
        "zip" => "zip",
        "kid" => "kid",
        "typ" => "typ",
        _ => "cty",
    }
}
