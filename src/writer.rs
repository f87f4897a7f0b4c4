//! The write pipeline: descriptors that assemble compact tokens.
//!
//! Descriptors stay mutable until `encode`. Header members are emitted in
//! the registered order (`alg`, `enc`, `zip`, `cty`, `typ`, `kid`) with
//! extension members following in insertion order; the emitted header
//! bytes become the JWE AAD, so nothing may touch the header after the
//! content-encryption step begins.

use rand::RngCore;
use serde_json::Value;

use crate::{
    alg::{
        CompressionAlgorithm,
        EncryptionAlgorithm,
        KeyManagementAlgorithm,
        SignatureAlgorithm,
    },
    b64,
    crypto::{
        compress,
        content::ContentCipher,
        key_wrap::{
            self,
            WrapExtras,
        },
    },
    error::JoseError,
    json::ObjectWriter,
    jwk::Jwk,
};

/// Authoring descriptor for a signed token.
pub struct JwsDescriptor {
    alg: SignatureAlgorithm,
    key: Option<Jwk>,
    typ: Option<String>,
    cty: Option<String>,
    kid: Option<String>,
    header_members: Vec<(String, Value)>,
    claims: Vec<(String, Value)>,
    raw_payload: Option<Vec<u8>>,
}

impl JwsDescriptor {
    /// A signed descriptor. The key must support `alg`.
    #[must_use]
    pub fn new(alg: SignatureAlgorithm, key: Jwk) -> Self {
        Self {
            alg,
            key: Some(key),
            typ: None,
            cty: None,
            kid: None,
            header_members: Vec::new(),
            claims: Vec::new(),
            raw_payload: None,
        }
    }

    /// An unsecured (`alg: none`) descriptor. Readers reject the output
    /// unless their policy explicitly opts in.
    #[must_use]
    pub fn unsecured() -> Self {
        Self {
            alg: SignatureAlgorithm::None,
            key: None,
            typ: None,
            cty: None,
            kid: None,
            header_members: Vec::new(),
            claims: Vec::new(),
            raw_payload: None,
        }
    }

    #[must_use]
    pub fn with_typ(mut self, typ: impl Into<String>) -> Self {
        self.typ = Some(typ.into());
        self
    }

    #[must_use]
    pub fn with_cty(mut self, cty: impl Into<String>) -> Self {
        self.cty = Some(cty.into());
        self
    }

    /// Overrides the `kid` header member; defaults to the key's `kid`.
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// Adds an extension header member. Re-adding a name replaces the
    /// earlier value.
    #[must_use]
    pub fn header_member(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        upsert(&mut self.header_members, name.into(), value.into());
        self
    }

    /// Adds one claim. Re-adding a name replaces the earlier value.
    #[must_use]
    pub fn claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        upsert(&mut self.claims, name.into(), value.into());
        self
    }

    /// Serializes `claims` as the whole payload, replacing any claims
    /// added member-wise.
    ///
    /// # Errors
    ///
    /// [`JoseError::MalformedToken`] when serialization fails.
    pub fn payload_from(mut self, claims: &impl serde::Serialize) -> Result<Self, JoseError> {
        self.raw_payload =
            Some(serde_json::to_vec(claims).map_err(|_| JoseError::MalformedToken)?);
        Ok(self)
    }

    /// Uses `payload` verbatim, e.g. an inner compact token for a nested
    /// JWS (set `cty` accordingly).
    #[must_use]
    pub fn with_raw_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.raw_payload = Some(payload.into());
        self
    }

    fn effective_kid(&self) -> Option<&str> {
        self.kid
            .as_deref()
            .or_else(|| self.key.as_ref().and_then(Jwk::kid))
    }

    fn header_bytes(&self) -> Result<Vec<u8>, JoseError> {
        let mut out = Vec::with_capacity(64);
        let mut writer = ObjectWriter::begin(&mut out);
        writer.member_str("alg", self.alg.name());
        if let Some(cty) = &self.cty {
            writer.member_str("cty", cty);
        }
        if let Some(typ) = &self.typ {
            writer.member_str("typ", typ);
        }
        if let Some(kid) = self.effective_kid() {
            writer.member_str("kid", kid);
        }
        write_extension_members(&mut writer, &self.header_members)?;
        writer.finish();
        Ok(out)
    }

    fn payload_bytes(&self) -> Result<Vec<u8>, JoseError> {
        if let Some(raw) = &self.raw_payload {
            return Ok(raw.clone());
        }
        let mut out = Vec::with_capacity(128);
        let mut writer = ObjectWriter::begin(&mut out);
        for (name, value) in &self.claims {
            writer.member_value(name, value)?;
        }
        writer.finish();
        Ok(out)
    }

    /// Assembles `b64(header) "." b64(payload) "." b64(signature)`.
    ///
    /// # Errors
    ///
    /// [`JoseError::SignatureKeyNotFound`] when the key cannot sign with
    /// the descriptor's algorithm.
    pub fn encode(&self) -> Result<String, JoseError> {
        let header = self.header_bytes()?;
        let payload = self.payload_bytes()?;

        let signer = match &self.key {
            None => {
                if !self.alg.is_unsecured() {
                    return Err(JoseError::SignatureKeyNotFound);
                }
                None
            }
            Some(key) => {
                if !key.supports_signature(self.alg) {
                    return Err(JoseError::SignatureKeyNotFound);
                }
                Some(key.create_signer(self.alg)?)
            }
        };
        let sig_len = signer.as_ref().map_or(0, |s| s.signature_len());

        let mut jwt = String::with_capacity(
            b64::encoded_len(header.len()) + 1 + b64::encoded_len(payload.len()) + 1
                + b64::encoded_len(sig_len),
        );
        b64::encode_append(&header, &mut jwt);
        jwt.push('.');
        b64::encode_append(&payload, &mut jwt);

        match signer {
            None => jwt.push('.'),
            Some(signer) => {
                let mut signature = Vec::with_capacity(sig_len);
                signer.sign_append(jwt.as_bytes(), &mut signature)?;
                jwt.push('.');
                b64::encode_append(&signature, &mut jwt);
            }
        }
        Ok(jwt)
    }
}

enum JwePayload {
    Nested(JwsDescriptor),
    Raw(Vec<u8>),
}

/// Authoring descriptor for an encrypted token, optionally wrapping a
/// signed one.
pub struct JweDescriptor {
    alg: KeyManagementAlgorithm,
    enc: EncryptionAlgorithm,
    zip: Option<CompressionAlgorithm>,
    key: Jwk,
    payload: JwePayload,
    typ: Option<String>,
    cty: Option<String>,
    kid: Option<String>,
    header_members: Vec<(String, Value)>,
    apu: Option<Vec<u8>>,
    apv: Option<Vec<u8>>,
}

impl JweDescriptor {
    /// Encrypts the output of `inner`: a nested JWS-inside-JWE. `cty` is
    /// set to `JWT` unless overridden.
    #[must_use]
    pub fn nested(
        alg: KeyManagementAlgorithm,
        enc: EncryptionAlgorithm,
        key: Jwk,
        inner: JwsDescriptor,
    ) -> Self {
        Self::with_payload(alg, enc, key, JwePayload::Nested(inner))
    }

    /// Encrypts arbitrary plaintext bytes (typically a claim-set JSON).
    #[must_use]
    pub fn raw(
        alg: KeyManagementAlgorithm,
        enc: EncryptionAlgorithm,
        key: Jwk,
        plaintext: impl Into<Vec<u8>>,
    ) -> Self {
        Self::with_payload(alg, enc, key, JwePayload::Raw(plaintext.into()))
    }

    fn with_payload(
        alg: KeyManagementAlgorithm,
        enc: EncryptionAlgorithm,
        key: Jwk,
        payload: JwePayload,
    ) -> Self {
        Self {
            alg,
            enc,
            zip: None,
            key,
            payload,
            typ: None,
            cty: None,
            kid: None,
            header_members: Vec::new(),
            apu: None,
            apv: None,
        }
    }

    /// Compresses the plaintext with raw DEFLATE before encryption.
    #[must_use]
    pub fn with_compression(mut self) -> Self {
        self.zip = Some(CompressionAlgorithm::Def);
        self
    }

    #[must_use]
    pub fn with_typ(mut self, typ: impl Into<String>) -> Self {
        self.typ = Some(typ.into());
        self
    }

    #[must_use]
    pub fn with_cty(mut self, cty: impl Into<String>) -> Self {
        self.cty = Some(cty.into());
        self
    }

    /// Overrides the `kid` header member; defaults to the key's `kid`.
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// `apu`/`apv` agreement party info for the ECDH-ES family; the raw
    /// bytes are base64url-encoded into the header and fed to the KDF.
    #[must_use]
    pub fn with_party_info(mut self, apu: impl Into<Vec<u8>>, apv: impl Into<Vec<u8>>) -> Self {
        self.apu = Some(apu.into());
        self.apv = Some(apv.into());
        self
    }

    /// Adds an extension header member. Re-adding a name replaces the
    /// earlier value.
    #[must_use]
    pub fn header_member(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        upsert(&mut self.header_members, name.into(), value.into());
        self
    }

    fn header_bytes(&self, extras: &WrapExtras, nested: bool) -> Result<Vec<u8>, JoseError> {
        let mut out = Vec::with_capacity(96);
        let mut writer = ObjectWriter::begin(&mut out);
        writer.member_str("alg", self.alg.name());
        writer.member_str("enc", self.enc.name());
        if let Some(zip) = self.zip {
            writer.member_str("zip", zip.name());
        }
        match (&self.cty, nested) {
            (Some(cty), _) => writer.member_str("cty", cty),
            (None, true) => writer.member_str("cty", "JWT"),
            (None, false) => {}
        }
        if let Some(typ) = &self.typ {
            writer.member_str("typ", typ);
        }
        if let Some(kid) = self.kid.as_deref().or_else(|| self.key.kid()) {
            writer.member_str("kid", kid);
        }
        if let Some(epk) = &extras.epk {
            let value =
                serde_json::to_value(epk).map_err(|_| JoseError::MalformedToken)?;
            writer.member_value("epk", &value)?;
        }
        if let Some(apu) = &self.apu {
            writer.member_str("apu", &b64::encode_string(apu));
        }
        if let Some(apv) = &self.apv {
            writer.member_str("apv", &b64::encode_string(apv));
        }
        if let Some(iv) = &extras.iv {
            writer.member_str("iv", iv);
        }
        if let Some(tag) = &extras.tag {
            writer.member_str("tag", tag);
        }
        if let Some(p2s) = &extras.p2s {
            writer.member_str("p2s", p2s);
        }
        if let Some(p2c) = extras.p2c {
            writer.member_u64("p2c", u64::from(p2c));
        }
        write_extension_members(&mut writer, &self.header_members)?;
        writer.finish();
        Ok(out)
    }

    /// Assembles the five-segment compact form. The header is emitted
    /// before the nonce is drawn and its encoded bytes are the AAD.
    ///
    /// # Errors
    ///
    /// [`JoseError::EncryptionKeyNotFound`] when the key cannot serve the
    /// key-management algorithm; inner descriptor errors pass through.
    pub fn encode(&self) -> Result<String, JoseError> {
        let (plaintext, nested) = match &self.payload {
            JwePayload::Nested(inner) => (inner.encode()?.into_bytes(), true),
            JwePayload::Raw(bytes) => (bytes.clone(), false),
        };

        if !self.key.supports_key_management(self.alg, self.enc) {
            return Err(JoseError::EncryptionKeyNotFound);
        }
        let outcome = key_wrap::wrap_cek(
            &self.key,
            self.alg,
            self.enc,
            self.apu.as_deref(),
            self.apv.as_deref(),
        )?;

        let header = self.header_bytes(&outcome.extras, nested)?;
        let mut token = String::with_capacity(
            b64::encoded_len(header.len())
                + b64::encoded_len(outcome.encrypted_key.len())
                + b64::encoded_len(self.enc.iv_len())
                + b64::encoded_len(plaintext.len() + 16)
                + b64::encoded_len(self.enc.tag_len())
                + 4,
        );
        b64::encode_append(&header, &mut token);
        // from here on the header is fixed: its encoded form is the AAD
        let aad_len = token.len();

        let plaintext = match self.zip {
            Some(CompressionAlgorithm::Def) => compress::deflate(&plaintext)?,
            None => plaintext,
        };

        let mut nonce = vec![0u8; self.enc.iv_len()];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let cipher = ContentCipher::new(self.enc, outcome.cek.bytes())?;
        let (ciphertext, tag) =
            cipher.encrypt(&plaintext, &nonce, token[..aad_len].as_bytes())?;

        token.push('.');
        b64::encode_append(&outcome.encrypted_key, &mut token);
        token.push('.');
        b64::encode_append(&nonce, &mut token);
        token.push('.');
        b64::encode_append(&ciphertext, &mut token);
        token.push('.');
        b64::encode_append(&tag, &mut token);
        Ok(token)
    }
}

fn upsert(members: &mut Vec<(String, Value)>, name: String, value: Value) {
    match members.iter_mut().find(|(existing, _)| *existing == name) {
        Some((_, slot)) => *slot = value,
        None => members.push((name, value)),
    }
}

/// Extension members may not shadow a registered name; the registered
/// members already occupy their fixed positions.
fn write_extension_members(
    writer: &mut ObjectWriter<'_>,
    members: &[(String, Value)],
) -> Result<(), JoseError> {
    for (name, value) in members {
        if let Some(registered) = registered_header_name(name) {
            return Err(JoseError::InvalidHeader(registered));
        }
        writer.member_value(name, value)?;
    }
    Ok(())
}

fn registered_header_name(name: &str) -> Option<&'static str> {
    match name {
        "alg" => Some("alg"),
        "enc" => Some("enc"),
        "zip" => Some("zip"),
        "cty" => Some("cty"),
        "typ" => Some("typ"),
        "kid" => Some("kid"),
        "epk" => Some("epk"),
        "apu" => Some("apu"),
        "apv" => Some("apv"),
        "iv" => Some("iv"),
        "tag" => Some("tag"),
        "p2s" => Some("p2s"),
        "p2c" => Some("p2c"),
        "crit" => None,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jws_header_member_order_is_fixed() {
        let key = Jwk::from_symmetric(&[0u8; 32]).with_kid("k1");
        let descriptor = JwsDescriptor::new(SignatureAlgorithm::HS256, key)
            .with_typ("JWT")
            .with_cty("text/plain")
            .header_member("x-extra", 7)
            .claim("sub", "alice");

        let header = descriptor.header_bytes().unwrap();
        assert_eq!(
            header,
            br#"{"alg":"HS256","cty":"text/plain","typ":"JWT","kid":"k1","x-extra":7}"#
        );
    }

    #[test]
    fn jws_encode_shape() {
        let key = Jwk::from_symmetric(&[0u8; 32]);
        let token = JwsDescriptor::new(SignatureAlgorithm::HS256, key)
            .claim("sub", "alice")
            .encode()
            .unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "eyJhbGciOiJIUzI1NiJ9");
        assert_eq!(parts[1], "eyJzdWIiOiJhbGljZSJ9");
        assert!(!parts[2].is_empty());
    }

    #[test]
    fn unsecured_encode_has_empty_signature() {
        let token = JwsDescriptor::unsecured().claim("sub", "alice").encode().unwrap();
        assert!(token.ends_with('.'));
        assert_eq!(token.split('.').count(), 3);
        assert!(token.starts_with("eyJhbGciOiJub25lIn0."));
    }

    #[test]
    fn claim_upsert_keeps_single_member() {
        let token = JwsDescriptor::unsecured()
            .claim("sub", "alice")
            .claim("sub", "bob")
            .encode()
            .unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let decoded = b64::decode_vec(payload.as_bytes()).unwrap();
        assert_eq!(decoded, br#"{"sub":"bob"}"#);
    }

    #[test]
    fn wrong_key_family_refuses_to_sign() {
        let key = Jwk::from_symmetric(&[0u8; 32]);
        let err = JwsDescriptor::new(SignatureAlgorithm::RS256, key)
            .encode()
            .unwrap_err();
        assert_eq!(err, JoseError::SignatureKeyNotFound);
    }

    #[test]
    fn serialized_payload_replaces_claims() {
        #[derive(serde::Serialize)]
        struct Claims {
            sub: &'static str,
        }
        let token = JwsDescriptor::unsecured()
            .claim("ignored", true)
            .payload_from(&Claims { sub: "alice" })
            .unwrap()
            .encode()
            .unwrap();
        let payload = token.split('.').nth(1).unwrap();
        assert_eq!(
            b64::decode_vec(payload.as_bytes()).unwrap(),
            br#"{"sub":"alice"}"#
        );
    }

    #[test]
    fn registered_names_rejected_as_extensions() {
        let key = Jwk::from_symmetric(&[0u8; 32]);
        let err = JwsDescriptor::new(SignatureAlgorithm::HS256, key)
            .header_member("alg", "HS512")
            .encode()
            .unwrap_err();
        assert_eq!(err, JoseError::InvalidHeader("alg"));
    }

    #[test]
    fn jwe_encode_has_five_segments() {
        let key = Jwk::from_symmetric(&[0u8; 32]);
        let token = JweDescriptor::raw(
            KeyManagementAlgorithm::Dir,
            EncryptionAlgorithm::A128CbcHs256,
            key,
            br#"{"hello":"world"}"#.to_vec(),
        )
        .encode()
        .unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 5);
        assert!(parts[1].is_empty()); // dir: no encrypted key
        let header = b64::decode_vec(parts[0].as_bytes()).unwrap();
        assert_eq!(header, br#"{"alg":"dir","enc":"A128CBC-HS256"}"#);
    }

    #[test]
    fn nested_payload_sets_cty() {
        let sign_key = Jwk::from_symmetric(&[0u8; 32]);
        let wrap_key = Jwk::from_symmetric(&[1u8; 16]);
        let token = JweDescriptor::nested(
            KeyManagementAlgorithm::A128Kw,
            EncryptionAlgorithm::A128CbcHs256,
            wrap_key,
            JwsDescriptor::new(SignatureAlgorithm::HS256, sign_key).claim("sub", "alice"),
        )
        .encode()
        .unwrap();

        let header =
            b64::decode_vec(token.split('.').next().unwrap().as_bytes()).unwrap();
        assert_eq!(
            header,
            br#"{"alg":"A128KW","enc":"A128CBC-HS256","cty":"JWT"}"#
        );
    }

    #[test]
    fn incapable_key_refuses_to_wrap() {
        let key = Jwk::from_symmetric(&[0u8; 32]); // 32 bytes cannot serve A128KW
        let err = JweDescriptor::raw(
            KeyManagementAlgorithm::A128Kw,
            EncryptionAlgorithm::A128Gcm,
            key,
            b"x".to_vec(),
        )
        .encode()
        .unwrap_err();
        assert_eq!(err, JoseError::EncryptionKeyNotFound);
    }
}
