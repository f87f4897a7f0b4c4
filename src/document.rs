//! The read-side token document.
//!
//! A document owns a rented buffer holding its decoded (or decrypted and
//! inflated) payload plus the index over it. Claim values are slices into
//! that buffer. Disposal returns the buffer to the pool exactly once;
//! afterwards payload access fails with
//! [`JoseError::InstanceInvalidated`].
//!
//! [`JoseError::InstanceInvalidated`]: crate::error::JoseError::InstanceInvalidated

use std::{
    borrow::Cow,
    sync::Arc,
};

use crate::{
    cache::CachedHeader,
    error::JoseError,
    header::JwtHeader,
    json::{
        JsonIndex,
        JsonKind,
    },
    pool::PooledBuf,
};

/// Which compact form the document was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Jws,
    Jwe,
}

enum DocPayload {
    /// Parsed claim set over the rented buffer.
    Claims { buf: PooledBuf, index: JsonIndex },
    /// Undecoded inner bytes (nested token with `ignore_nested_token`,
    /// or a non-JSON `cty`).
    Raw { buf: PooledBuf },
    /// Recursively parsed nested token.
    Nested(Box<JwtDocument>),
}

/// A successfully parsed and validated token.
pub struct JwtDocument {
    header: Arc<CachedHeader>,
    kind: TokenKind,
    payload: Option<DocPayload>,
}

impl JwtDocument {
    pub(crate) fn new_claims(
        header: Arc<CachedHeader>,
        kind: TokenKind,
        buf: PooledBuf,
        index: JsonIndex,
    ) -> Self {
        Self {
            header,
            kind,
            payload: Some(DocPayload::Claims { buf, index }),
        }
    }

    pub(crate) fn new_raw(header: Arc<CachedHeader>, kind: TokenKind, buf: PooledBuf) -> Self {
        Self {
            header,
            kind,
            payload: Some(DocPayload::Raw { buf }),
        }
    }

    pub(crate) fn new_nested(
        header: Arc<CachedHeader>,
        kind: TokenKind,
        inner: JwtDocument,
    ) -> Self {
        Self {
            header,
            kind,
            payload: Some(DocPayload::Nested(Box::new(inner))),
        }
    }

    #[must_use]
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// The parsed header. Headers are reference-counted (they may be
    /// shared with the header cache) and stay readable after disposal.
    #[must_use]
    pub fn header(&self) -> &JwtHeader {
        &self.header.header
    }

    /// The innermost parsed token, following nesting.
    #[must_use]
    pub fn innermost(&self) -> &JwtDocument {
        match &self.payload {
            Some(DocPayload::Nested(inner)) => inner.innermost(),
            _ => self,
        }
    }

    /// The nested document, when this token carried `cty: JWT` and the
    /// policy parsed it.
    #[must_use]
    pub fn nested(&self) -> Option<&JwtDocument> {
        match &self.payload {
            Some(DocPayload::Nested(inner)) => Some(inner),
            _ => None,
        }
    }

    /// The claim set. For nested tokens this is the innermost claim set.
    ///
    /// # Errors
    ///
    /// [`JoseError::InstanceInvalidated`] after disposal;
    /// [`JoseError::MalformedToken`] when the payload was kept raw
    /// (`ignore_nested_token`) and holds no claims.
    pub fn payload(&self) -> Result<ClaimSet<'_>, JoseError> {
        match &self.payload {
            None => Err(JoseError::InstanceInvalidated),
            Some(DocPayload::Claims { buf, index }) => Ok(ClaimSet {
                buf: buf.as_slice(),
                index,
            }),
            Some(DocPayload::Raw { .. }) => Err(JoseError::MalformedToken),
            Some(DocPayload::Nested(inner)) => inner.payload(),
        }
    }

    /// The payload bytes: claim JSON, or the raw inner compact token when
    /// nesting was left unparsed.
    ///
    /// # Errors
    ///
    /// [`JoseError::InstanceInvalidated`] after disposal.
    pub fn payload_bytes(&self) -> Result<&[u8], JoseError> {
        match &self.payload {
            None => Err(JoseError::InstanceInvalidated),
            Some(DocPayload::Claims { buf, .. } | DocPayload::Raw { buf }) => Ok(buf.as_slice()),
            Some(DocPayload::Nested(inner)) => inner.payload_bytes(),
        }
    }

    /// Returns the rented buffer to the pool and invalidates every
    /// derived view. Calling it again is a no-op.
    pub fn dispose(&mut self) {
        // take-once: the buffer can only travel back to the pool once
        drop(self.payload.take());
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.payload.is_none()
    }
}

impl std::fmt::Debug for JwtDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtDocument")
            .field("kind", &self.kind)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Claim-set view over a live document.
#[derive(Clone, Copy, Debug)]
pub struct ClaimSet<'a> {
    buf: &'a [u8],
    index: &'a JsonIndex,
}

impl<'a> ClaimSet<'a> {
    pub(crate) fn over(buf: &'a [u8], index: &'a JsonIndex) -> Self {
        Self { buf, index }
    }

    /// The root object element.
    #[must_use]
    pub fn root(&self) -> JwtElement<'a> {
        JwtElement {
            buf: self.buf,
            index: self.index,
            node: self.index.root(),
        }
    }

    /// A top-level claim by name (duplicates resolve to the last).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<JwtElement<'a>> {
        self.root().member(name)
    }

    #[must_use]
    pub fn str_claim(&self, name: &str) -> Option<Cow<'a, str>> {
        self.get(name)?.as_str()
    }

    #[must_use]
    pub fn int_claim(&self, name: &str) -> Option<i64> {
        self.get(name)?.as_i64()
    }

    /// `aud` values: a lone string or an array of strings.
    #[must_use]
    pub fn audiences(&self) -> Vec<Cow<'a, str>> {
        audiences_of(self.buf, self.index)
    }

    #[must_use]
    pub fn issuer(&self) -> Option<Cow<'a, str>> {
        self.str_claim("iss")
    }

    #[must_use]
    pub fn subject(&self) -> Option<Cow<'a, str>> {
        self.str_claim("sub")
    }

    #[must_use]
    pub fn jwt_id(&self) -> Option<Cow<'a, str>> {
        self.str_claim("jti")
    }

    /// `exp` as NumericDate seconds.
    #[must_use]
    pub fn expiration(&self) -> Option<i64> {
        self.int_claim("exp")
    }

    /// `nbf` as NumericDate seconds.
    #[must_use]
    pub fn not_before(&self) -> Option<i64> {
        self.int_claim("nbf")
    }

    /// `iat` as NumericDate seconds.
    #[must_use]
    pub fn issued_at(&self) -> Option<i64> {
        self.int_claim("iat")
    }
}

/// `aud` extraction shared with the validation path.
pub(crate) fn audiences_of<'a>(buf: &'a [u8], index: &JsonIndex) -> Vec<Cow<'a, str>> {
    let Some(aud) = index.member(buf, index.root(), b"aud") else {
        return Vec::new();
    };
    match index.kind(aud) {
        JsonKind::String => index.str_value(buf, aud).into_iter().collect(),
        JsonKind::Array => index
            .items(aud)
            .filter_map(|item| index.str_value(buf, item))
            .collect(),
        _ => Vec::new(),
    }
}

/// A lightweight handle to one node of a document's JSON index.
#[derive(Clone, Copy)]
pub struct JwtElement<'a> {
    buf: &'a [u8],
    index: &'a JsonIndex,
    node: u32,
}

impl<'a> JwtElement<'a> {
    #[must_use]
    pub fn kind(&self) -> JsonKind {
        self.index.kind(self.node)
    }

    #[must_use]
    pub fn member(&self, name: &str) -> Option<JwtElement<'a>> {
        if self.kind() != JsonKind::Object {
            return None;
        }
        let node = self.index.member(self.buf, self.node, name.as_bytes())?;
        Some(JwtElement { node, ..*self })
    }

    /// Array items, in order. Empty for non-arrays.
    #[must_use]
    pub fn items(&self) -> Vec<JwtElement<'a>> {
        if self.kind() != JsonKind::Array {
            return Vec::new();
        }
        self.index
            .items(self.node)
            .map(|node| JwtElement { node, ..*self })
            .collect()
    }

    #[must_use]
    pub fn as_str(&self) -> Option<Cow<'a, str>> {
        self.index.str_value(self.buf, self.node)
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.index.i64_value(self.buf, self.node)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        self.index.bool_value(self.node)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.kind() == JsonKind::Null
    }

    /// The raw JSON text of this node.
    #[must_use]
    pub fn raw(&self) -> &'a [u8] {
        self.index.raw_value(self.buf, self.node)
    }
}
