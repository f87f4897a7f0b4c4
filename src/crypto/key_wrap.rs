//! CEK transport: direct use, AES key wrap, AES-GCM key encryption, RSA
//! transport, ECDH-ES agreement with Concat KDF, and PBES2.
//!
//! Wrapping happens before the header is emitted; everything a wrap adds
//! to the header (`epk`, `iv`/`tag`, `p2s`/`p2c`) travels back through
//! [`WrapExtras`]. Unwrapping reads the same members off the parsed
//! header.

use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rsa::{
    Oaep,
    Pkcs1v15Encrypt,
};
use sha1::Sha1;
use sha2::{
    Digest,
    Sha256,
    Sha384,
    Sha512,
};
use zeroize::Zeroize;

use crate::{
    alg::{
        EncryptionAlgorithm,
        KeyManagementAlgorithm,
    },
    b64,
    crypto::{
        CekMaterial,
        content::ContentCipher,
    },
    error::JoseError,
    header::JwtHeader,
    jwk::{
        EcCurve,
        Jwk,
    },
};

/// PBES2 iteration count emitted by the writer.
pub(crate) const PBES2_ITERATIONS: u32 = 4096;
/// Upper bound accepted from inbound `p2c` headers.
const PBES2_MAX_ITERATIONS: i64 = 1_000_000;
const PBES2_SALT_LEN: usize = 16;

/// Result of wrapping: the CEK to encrypt with, the encrypted-key
/// segment bytes, and any header members the wrap produced.
pub(crate) struct WrapOutcome {
    pub cek: CekMaterial,
    pub encrypted_key: Vec<u8>,
    pub extras: WrapExtras,
}

#[derive(Default)]
pub(crate) struct WrapExtras {
    pub epk: Option<Jwk>,
    pub iv: Option<String>,
    pub tag: Option<String>,
    pub p2s: Option<String>,
    pub p2c: Option<u32>,
}

/// Computes or wraps a CEK for the writer pipeline.
pub(crate) fn wrap_cek(
    key: &Jwk,
    alg: KeyManagementAlgorithm,
    enc: EncryptionAlgorithm,
    apu: Option<&[u8]>,
    apv: Option<&[u8]>,
) -> Result<WrapOutcome, JoseError> {
    use KeyManagementAlgorithm as Kma;
    match alg {
        Kma::Dir => {
            let k = key.symmetric_key().ok_or(JoseError::EncryptionKeyNotFound)?;
            if k.len() != enc.key_len() {
                return Err(JoseError::EncryptionKeyNotFound);
            }
            Ok(WrapOutcome {
                cek: CekMaterial::new(k.to_vec()),
                encrypted_key: Vec::new(),
                extras: WrapExtras::default(),
            })
        }
        Kma::A128Kw | Kma::A192Kw | Kma::A256Kw => {
            let kek = key.symmetric_key().ok_or(JoseError::EncryptionKeyNotFound)?;
            let cek = CekMaterial::random(enc.key_len());
            let encrypted_key = aes_kw_wrap(kek, cek.bytes())?;
            Ok(WrapOutcome {
                cek,
                encrypted_key,
                extras: WrapExtras::default(),
            })
        }
        Kma::A128GcmKw | Kma::A192GcmKw | Kma::A256GcmKw => {
            let kek = key.symmetric_key().ok_or(JoseError::EncryptionKeyNotFound)?;
            let cek = CekMaterial::random(enc.key_len());
            let mut iv = [0u8; 12];
            rand::rngs::OsRng.fill_bytes(&mut iv);
            let (encrypted_key, tag) =
                gcm_kek_cipher(kek)?.encrypt(cek.bytes(), &iv, b"")?;
            Ok(WrapOutcome {
                cek,
                encrypted_key,
                extras: WrapExtras {
                    iv: Some(b64::encode_string(iv)),
                    tag: Some(b64::encode_string(tag)),
                    ..WrapExtras::default()
                },
            })
        }
        Kma::Rsa1_5 | Kma::RsaOaep | Kma::RsaOaep256 | Kma::RsaOaep384 | Kma::RsaOaep512 => {
            let cek = CekMaterial::random(enc.key_len());
            let encrypted_key = rsa_wrap(key, alg, cek.bytes())?;
            Ok(WrapOutcome {
                cek,
                encrypted_key,
                extras: WrapExtras::default(),
            })
        }
        Kma::EcdhEs => {
            let (mut z, epk) = ecdh_agree_with_recipient(key)?;
            let cek = concat_kdf(
                &z,
                enc.name(),
                apu.unwrap_or_default(),
                apv.unwrap_or_default(),
                enc.key_len(),
            );
            z.zeroize();
            Ok(WrapOutcome {
                cek: CekMaterial::new(cek),
                encrypted_key: Vec::new(),
                extras: WrapExtras {
                    epk: Some(epk),
                    ..WrapExtras::default()
                },
            })
        }
        Kma::EcdhEsA128Kw | Kma::EcdhEsA192Kw | Kma::EcdhEsA256Kw => {
            let kek_len = alg.kek_len().ok_or(JoseError::EncryptionKeyNotFound)?;
            let (mut z, epk) = ecdh_agree_with_recipient(key)?;
            let mut kek = concat_kdf(
                &z,
                alg.name(),
                apu.unwrap_or_default(),
                apv.unwrap_or_default(),
                kek_len,
            );
            z.zeroize();
            let cek = CekMaterial::random(enc.key_len());
            let encrypted_key = aes_kw_wrap(&kek, cek.bytes());
            kek.zeroize();
            Ok(WrapOutcome {
                cek,
                encrypted_key: encrypted_key?,
                extras: WrapExtras {
                    epk: Some(epk),
                    ..WrapExtras::default()
                },
            })
        }
        Kma::Pbes2Hs256A128Kw | Kma::Pbes2Hs384A192Kw | Kma::Pbes2Hs512A256Kw => {
            let password = key.password().ok_or(JoseError::EncryptionKeyNotFound)?;
            let mut salt_input = [0u8; PBES2_SALT_LEN];
            rand::rngs::OsRng.fill_bytes(&mut salt_input);
            let mut kek = pbes2_derive(alg, password, &salt_input, PBES2_ITERATIONS)?;
            let cek = CekMaterial::random(enc.key_len());
            let encrypted_key = aes_kw_wrap(&kek, cek.bytes());
            kek.zeroize();
            Ok(WrapOutcome {
                cek,
                encrypted_key: encrypted_key?,
                extras: WrapExtras {
                    p2s: Some(b64::encode_string(salt_input)),
                    p2c: Some(PBES2_ITERATIONS),
                    ..WrapExtras::default()
                },
            })
        }
    }
}

/// Recovers the CEK for the reader pipeline.
pub(crate) fn unwrap_cek(
    key: &Jwk,
    alg: KeyManagementAlgorithm,
    enc: EncryptionAlgorithm,
    encrypted_key: &[u8],
    header: &JwtHeader,
) -> Result<CekMaterial, JoseError> {
    use KeyManagementAlgorithm as Kma;
    let cek = match alg {
        Kma::Dir => {
            if !encrypted_key.is_empty() {
                return Err(JoseError::DecryptionFailed);
            }
            let k = key.symmetric_key().ok_or(JoseError::DecryptionFailed)?;
            k.to_vec()
        }
        Kma::A128Kw | Kma::A192Kw | Kma::A256Kw => {
            let kek = key.symmetric_key().ok_or(JoseError::DecryptionFailed)?;
            aes_kw_unwrap(kek, encrypted_key)?
        }
        Kma::A128GcmKw | Kma::A192GcmKw | Kma::A256GcmKw => {
            let kek = key.symmetric_key().ok_or(JoseError::DecryptionFailed)?;
            let iv = header_b64_member(header, "iv")?;
            let tag = header_b64_member(header, "tag")?;
            gcm_kek_cipher(kek)?.decrypt(encrypted_key, &iv, b"", &tag)?
        }
        Kma::Rsa1_5 | Kma::RsaOaep | Kma::RsaOaep256 | Kma::RsaOaep384 | Kma::RsaOaep512 => {
            rsa_unwrap(key, alg, encrypted_key)?
        }
        Kma::EcdhEs => {
            if !encrypted_key.is_empty() {
                return Err(JoseError::DecryptionFailed);
            }
            let mut z = ecdh_agree_with_ephemeral(key, header)?;
            let (apu, apv) = agreement_party_info(header)?;
            let cek = concat_kdf(&z, enc.name(), &apu, &apv, enc.key_len());
            z.zeroize();
            cek
        }
        Kma::EcdhEsA128Kw | Kma::EcdhEsA192Kw | Kma::EcdhEsA256Kw => {
            let kek_len = alg.kek_len().ok_or(JoseError::DecryptionFailed)?;
            let mut z = ecdh_agree_with_ephemeral(key, header)?;
            let (apu, apv) = agreement_party_info(header)?;
            let mut kek = concat_kdf(&z, alg.name(), &apu, &apv, kek_len);
            z.zeroize();
            let cek = aes_kw_unwrap(&kek, encrypted_key);
            kek.zeroize();
            cek?
        }
        Kma::Pbes2Hs256A128Kw | Kma::Pbes2Hs384A192Kw | Kma::Pbes2Hs512A256Kw => {
            let password = key.password().ok_or(JoseError::DecryptionFailed)?;
            let salt_input = header_b64_member(header, "p2s")?;
            let iterations = header
                .member_i64("p2c")
                .filter(|&count| count >= 1 && count <= PBES2_MAX_ITERATIONS)
                .ok_or(JoseError::DecryptionFailed)?;
            let mut kek = pbes2_derive(alg, password, &salt_input, iterations as u32)?;
            let cek = aes_kw_unwrap(&kek, encrypted_key);
            kek.zeroize();
            cek?
        }
    };
    if cek.len() != enc.key_len() {
        return Err(JoseError::DecryptionFailed);
    }
    Ok(CekMaterial::new(cek))
}

fn header_b64_member(header: &JwtHeader, name: &str) -> Result<Vec<u8>, JoseError> {
    let value = header
        .member_str(name)
        .ok_or(JoseError::DecryptionFailed)?;
    b64::decode_vec(value.as_bytes()).map_err(|_| JoseError::DecryptionFailed)
}

fn agreement_party_info(header: &JwtHeader) -> Result<(Vec<u8>, Vec<u8>), JoseError> {
    let decode = |name: &str| -> Result<Vec<u8>, JoseError> {
        match header.member_str(name) {
            None => Ok(Vec::new()),
            Some(value) => {
                b64::decode_vec(value.as_bytes()).map_err(|_| JoseError::InvalidHeader("apu"))
            }
        }
    };
    Ok((decode("apu")?, decode("apv")?))
}

fn aes_kw_wrap(kek: &[u8], cek: &[u8]) -> Result<Vec<u8>, JoseError> {
    match kek.len() {
        16 => aes_kw::KekAes128::from(kek_array::<16>(kek)?)
            .wrap_vec(cek)
            .map_err(|_| JoseError::DecryptionFailed),
        24 => aes_kw::KekAes192::from(kek_array::<24>(kek)?)
            .wrap_vec(cek)
            .map_err(|_| JoseError::DecryptionFailed),
        32 => aes_kw::KekAes256::from(kek_array::<32>(kek)?)
            .wrap_vec(cek)
            .map_err(|_| JoseError::DecryptionFailed),
        _ => Err(JoseError::DecryptionFailed),
    }
}

fn aes_kw_unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>, JoseError> {
    match kek.len() {
        16 => aes_kw::KekAes128::from(kek_array::<16>(kek)?)
            .unwrap_vec(wrapped)
            .map_err(|_| JoseError::DecryptionFailed),
        24 => aes_kw::KekAes192::from(kek_array::<24>(kek)?)
            .unwrap_vec(wrapped)
            .map_err(|_| JoseError::DecryptionFailed),
        32 => aes_kw::KekAes256::from(kek_array::<32>(kek)?)
            .unwrap_vec(wrapped)
            .map_err(|_| JoseError::DecryptionFailed),
        _ => Err(JoseError::DecryptionFailed),
    }
}

fn kek_array<const N: usize>(kek: &[u8]) -> Result<[u8; N], JoseError> {
    <[u8; N]>::try_from(kek).map_err(|_| JoseError::DecryptionFailed)
}

/// GCM key encryption reuses the content cipher at the KEK's width; the
/// AAD is empty per RFC 7518 §4.7.
fn gcm_kek_cipher(kek: &[u8]) -> Result<ContentCipher, JoseError> {
    let enc = match kek.len() {
        16 => EncryptionAlgorithm::A128Gcm,
        24 => EncryptionAlgorithm::A192Gcm,
        32 => EncryptionAlgorithm::A256Gcm,
        _ => return Err(JoseError::DecryptionFailed),
    };
    ContentCipher::new(enc, kek)
}

fn rsa_wrap(
    key: &Jwk,
    alg: KeyManagementAlgorithm,
    cek: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let public = key.rsa_public_key().ok_or(JoseError::EncryptionKeyNotFound)?;
    let mut rng = rand::rngs::OsRng;
    let result = match alg {
        KeyManagementAlgorithm::Rsa1_5 => public.encrypt(&mut rng, Pkcs1v15Encrypt, cek),
        KeyManagementAlgorithm::RsaOaep => public.encrypt(&mut rng, Oaep::new::<Sha1>(), cek),
        KeyManagementAlgorithm::RsaOaep256 => {
            public.encrypt(&mut rng, Oaep::new::<Sha256>(), cek)
        }
        KeyManagementAlgorithm::RsaOaep384 => {
            public.encrypt(&mut rng, Oaep::new::<Sha384>(), cek)
        }
        KeyManagementAlgorithm::RsaOaep512 => {
            public.encrypt(&mut rng, Oaep::new::<Sha512>(), cek)
        }
        _ => return Err(JoseError::EncryptionKeyNotFound),
    };
    result.map_err(|_| JoseError::DecryptionFailed)
}

fn rsa_unwrap(
    key: &Jwk,
    alg: KeyManagementAlgorithm,
    encrypted_key: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let private = key.rsa_private_key().ok_or(JoseError::DecryptionFailed)?;
    let result = match alg {
        KeyManagementAlgorithm::Rsa1_5 => private.decrypt(Pkcs1v15Encrypt, encrypted_key),
        KeyManagementAlgorithm::RsaOaep => private.decrypt(Oaep::new::<Sha1>(), encrypted_key),
        KeyManagementAlgorithm::RsaOaep256 => {
            private.decrypt(Oaep::new::<Sha256>(), encrypted_key)
        }
        KeyManagementAlgorithm::RsaOaep384 => {
            private.decrypt(Oaep::new::<Sha384>(), encrypted_key)
        }
        KeyManagementAlgorithm::RsaOaep512 => {
            private.decrypt(Oaep::new::<Sha512>(), encrypted_key)
        }
        _ => return Err(JoseError::DecryptionFailed),
    };
    result.map_err(|_| JoseError::DecryptionFailed)
}

/// Ephemeral-static agreement against the recipient's public key;
/// returns the shared secret and the ephemeral public JWK for `epk`.
fn ecdh_agree_with_recipient(recipient: &Jwk) -> Result<(Vec<u8>, Jwk), JoseError> {
    let curve = recipient.ec_curve().ok_or(JoseError::EncryptionKeyNotFound)?;
    let (x, y) = recipient
        .ec_public_coordinates()
        .ok_or(JoseError::EncryptionKeyNotFound)?;
    macro_rules! agree {
        ($curve:ident, $variant:expr) => {{
            let point =
                $curve::EncodedPoint::from_affine_coordinates(x.into(), y.into(), false);
            let public = Option::<$curve::PublicKey>::from($curve::PublicKey::from_encoded_point(
                &point,
            ))
            .ok_or(JoseError::EncryptionKeyNotFound)?;
            let ephemeral = $curve::ecdh::EphemeralSecret::random(&mut rand::rngs::OsRng);
            let ephemeral_point = $curve::PublicKey::from(&ephemeral).to_encoded_point(false);
            let z = ephemeral.diffie_hellman(&public).raw_secret_bytes().to_vec();
            let epk = Jwk::from_ec_components(
                $variant,
                ephemeral_point.x().ok_or(JoseError::EncryptionKeyNotFound)?,
                ephemeral_point.y().ok_or(JoseError::EncryptionKeyNotFound)?,
                None,
            )?;
            Ok((z, epk))
        }};
    }
    match curve {
        EcCurve::P256 => agree!(p256, EcCurve::P256),
        EcCurve::P384 => agree!(p384, EcCurve::P384),
        EcCurve::P521 => agree!(p521, EcCurve::P521),
    }
}

/// Static-ephemeral agreement: our private scalar against the header's
/// `epk`.
fn ecdh_agree_with_ephemeral(own: &Jwk, header: &JwtHeader) -> Result<Vec<u8>, JoseError> {
    let curve = own.ec_curve().ok_or(JoseError::DecryptionFailed)?;
    let d = own.ec_private_scalar().ok_or(JoseError::DecryptionFailed)?;
    let epk_raw = header
        .member_raw_value("epk")
        .ok_or(JoseError::InvalidHeader("epk"))?;
    let epk: Jwk =
        serde_json::from_slice(epk_raw).map_err(|_| JoseError::InvalidHeader("epk"))?;
    if epk.ec_curve() != Some(curve) {
        return Err(JoseError::InvalidHeader("epk"));
    }
    let (x, y) = epk
        .ec_public_coordinates()
        .ok_or(JoseError::InvalidHeader("epk"))?;
    macro_rules! agree {
        ($curve:ident) => {{
            let secret =
                $curve::SecretKey::from_slice(d).map_err(|_| JoseError::DecryptionFailed)?;
            let point =
                $curve::EncodedPoint::from_affine_coordinates(x.into(), y.into(), false);
            let public = Option::<$curve::PublicKey>::from($curve::PublicKey::from_encoded_point(
                &point,
            ))
            .ok_or(JoseError::InvalidHeader("epk"))?;
            let shared = $curve::ecdh::diffie_hellman(
                secret.to_nonzero_scalar(),
                public.as_affine(),
            );
            Ok(shared.raw_secret_bytes().to_vec())
        }};
    }
    match curve {
        EcCurve::P256 => agree!(p256),
        EcCurve::P384 => agree!(p384),
        EcCurve::P521 => agree!(p521),
    }
}

/// Concat KDF (NIST SP 800-56A §5.8.1) with SHA-256, as RFC 7518 §4.6
/// profiles it: `AlgorithmID`, `PartyUInfo`, `PartyVInfo` are
/// length-prefixed, `SuppPubInfo` is the key bit length.
fn concat_kdf(z: &[u8], alg_id: &str, apu: &[u8], apv: &[u8], key_len: usize) -> Vec<u8> {
    let mut derived = Vec::with_capacity(key_len.next_multiple_of(32));
    let mut counter = 1u32;
    while derived.len() < key_len {
        let mut hasher = Sha256::new();
        hasher.update(counter.to_be_bytes());
        hasher.update(z);
        hasher.update((alg_id.len() as u32).to_be_bytes());
        hasher.update(alg_id.as_bytes());
        hasher.update((apu.len() as u32).to_be_bytes());
        hasher.update(apu);
        hasher.update((apv.len() as u32).to_be_bytes());
        hasher.update(apv);
        hasher.update(((key_len * 8) as u32).to_be_bytes());
        derived.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    derived.truncate(key_len);
    derived
}

fn pbes2_derive(
    alg: KeyManagementAlgorithm,
    password: &[u8],
    salt_input: &[u8],
    iterations: u32,
) -> Result<Vec<u8>, JoseError> {
    let kek_len = alg.kek_len().ok_or(JoseError::DecryptionFailed)?;
    // salt is the algorithm name, a zero byte, then the p2s value
    let mut salt = Vec::with_capacity(alg.name().len() + 1 + salt_input.len());
    salt.extend_from_slice(alg.name().as_bytes());
    salt.push(0);
    salt.extend_from_slice(salt_input);

    let mut kek = vec![0u8; kek_len];
    match alg {
        KeyManagementAlgorithm::Pbes2Hs256A128Kw => {
            pbkdf2_hmac::<Sha256>(password, &salt, iterations, &mut kek);
        }
        KeyManagementAlgorithm::Pbes2Hs384A192Kw => {
            pbkdf2_hmac::<Sha384>(password, &salt, iterations, &mut kek);
        }
        KeyManagementAlgorithm::Pbes2Hs512A256Kw => {
            pbkdf2_hmac::<Sha512>(password, &salt, iterations, &mut kek);
        }
        _ => return Err(JoseError::DecryptionFailed),
    }
    Ok(kek)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(json: &[u8]) -> JwtHeader {
        JwtHeader::parse(json.to_vec()).unwrap()
    }

    #[test]
    fn rfc3394_aes128_wrap_vector() {
        // RFC 3394 §4.1
        let kek = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let cek = hex::decode("00112233445566778899aabbccddeeff").unwrap();
        let wrapped = aes_kw_wrap(&kek, &cek).unwrap();
        assert_eq!(
            hex::encode(&wrapped),
            "1fa68b0a8112b447aef34bd8fb5a7b829d3e862371d2cfe5"
        );
        assert_eq!(aes_kw_unwrap(&kek, &wrapped).unwrap(), cek);
    }

    #[test]
    fn aes_kw_tamper_detected() {
        let kek = [0u8; 16];
        let mut wrapped = aes_kw_wrap(&kek, &[1u8; 16]).unwrap();
        wrapped[3] ^= 1;
        assert_eq!(
            aes_kw_unwrap(&kek, &wrapped).unwrap_err(),
            JoseError::DecryptionFailed
        );
    }

    #[test]
    fn concat_kdf_rfc7518_appendix_c() {
        // RFC 7518 appendix C: ECDH-ES direct, enc = A128GCM,
        // apu = "Alice", apv = "Bob"
        let z = [
            158, 86, 217, 29, 129, 113, 53, 211, 114, 131, 66, 131, 191, 132, 38, 156, 251, 49,
            110, 163, 218, 128, 106, 72, 246, 218, 167, 121, 140, 254, 144, 196,
        ];
        let derived = concat_kdf(&z, "A128GCM", b"Alice", b"Bob", 16);
        assert_eq!(
            derived,
            [86, 170, 141, 234, 248, 35, 109, 32, 92, 34, 40, 205, 113, 167, 16, 26]
        );
    }

    #[test]
    fn concat_kdf_multi_round() {
        let derived = concat_kdf(b"shared-secret", "ECDH-ES+A256KW", b"", b"", 64);
        assert_eq!(derived.len(), 64);
        // the first hash block must match the truncated single-round form
        let first = concat_kdf(b"shared-secret", "ECDH-ES+A256KW", b"", b"", 32);
        assert_eq!(&derived[..32], &first[..]);
        // but a second round produces different trailing bytes
        assert_ne!(&derived[32..], &derived[..32]);
    }

    #[test]
    fn dir_round_trip() {
        let key = Jwk::from_symmetric(&[0u8; 32]);
        let enc = EncryptionAlgorithm::A128CbcHs256;
        let outcome = wrap_cek(&key, KeyManagementAlgorithm::Dir, enc, None, None).unwrap();
        assert!(outcome.encrypted_key.is_empty());
        assert_eq!(outcome.cek.bytes(), &[0u8; 32]);

        let h = header(br#"{"alg":"dir","enc":"A128CBC-HS256"}"#);
        let cek = unwrap_cek(&key, KeyManagementAlgorithm::Dir, enc, b"", &h).unwrap();
        assert_eq!(cek.bytes(), &[0u8; 32]);
    }

    #[test]
    fn dir_with_encrypted_key_segment_rejected() {
        let key = Jwk::from_symmetric(&[0u8; 32]);
        let h = header(br#"{"alg":"dir","enc":"A128CBC-HS256"}"#);
        let err = unwrap_cek(
            &key,
            KeyManagementAlgorithm::Dir,
            EncryptionAlgorithm::A128CbcHs256,
            b"not-empty",
            &h,
        )
        .unwrap_err();
        assert_eq!(err, JoseError::DecryptionFailed);
    }

    #[test]
    fn aes_kw_round_trip_through_outcome() {
        let key = Jwk::from_symmetric(&[7u8; 16]);
        let enc = EncryptionAlgorithm::A128Gcm;
        let outcome = wrap_cek(&key, KeyManagementAlgorithm::A128Kw, enc, None, None).unwrap();
        assert_eq!(outcome.encrypted_key.len(), 24);

        let h = header(br#"{"alg":"A128KW","enc":"A128GCM"}"#);
        let cek = unwrap_cek(
            &key,
            KeyManagementAlgorithm::A128Kw,
            enc,
            &outcome.encrypted_key,
            &h,
        )
        .unwrap();
        assert_eq!(cek.bytes(), outcome.cek.bytes());
    }

    #[test]
    fn gcm_kw_round_trip_uses_header_iv_and_tag() {
        let key = Jwk::from_symmetric(&[9u8; 32]);
        let enc = EncryptionAlgorithm::A128Gcm;
        let outcome =
            wrap_cek(&key, KeyManagementAlgorithm::A256GcmKw, enc, None, None).unwrap();
        let iv = outcome.extras.iv.unwrap();
        let tag = outcome.extras.tag.unwrap();

        let json = format!(r#"{{"alg":"A256GCMKW","enc":"A128GCM","iv":"{iv}","tag":"{tag}"}}"#);
        let h = header(json.as_bytes());
        let cek = unwrap_cek(
            &key,
            KeyManagementAlgorithm::A256GcmKw,
            enc,
            &outcome.encrypted_key,
            &h,
        )
        .unwrap();
        assert_eq!(cek.bytes(), outcome.cek.bytes());

        // missing iv/tag members fail cleanly
        let h = header(br#"{"alg":"A256GCMKW","enc":"A128GCM"}"#);
        let err = unwrap_cek(
            &key,
            KeyManagementAlgorithm::A256GcmKw,
            enc,
            &outcome.encrypted_key,
            &h,
        )
        .unwrap_err();
        assert_eq!(err, JoseError::DecryptionFailed);
    }

    #[test]
    fn pbes2_round_trip() {
        let key = Jwk::from_password(b"entrap-o\xe2\x80\x93peter");
        let enc = EncryptionAlgorithm::A128CbcHs256;
        let alg = KeyManagementAlgorithm::Pbes2Hs256A128Kw;
        let outcome = wrap_cek(&key, alg, enc, None, None).unwrap();
        let p2s = outcome.extras.p2s.unwrap();
        let p2c = outcome.extras.p2c.unwrap();
        assert_eq!(p2c, PBES2_ITERATIONS);

        let json = format!(
            r#"{{"alg":"PBES2-HS256+A128KW","enc":"A128CBC-HS256","p2s":"{p2s}","p2c":{p2c}}}"#
        );
        let h = header(json.as_bytes());
        let cek = unwrap_cek(&key, alg, enc, &outcome.encrypted_key, &h).unwrap();
        assert_eq!(cek.bytes(), outcome.cek.bytes());

        // wrong password fails the key unwrap integrity check
        let wrong = Jwk::from_password(b"wrong");
        let err = unwrap_cek(&wrong, alg, enc, &outcome.encrypted_key, &h).unwrap_err();
        assert_eq!(err, JoseError::DecryptionFailed);
    }

    #[test]
    fn pbes2_iteration_bounds_enforced() {
        let key = Jwk::from_password(b"pw");
        let enc = EncryptionAlgorithm::A128CbcHs256;
        let alg = KeyManagementAlgorithm::Pbes2Hs256A128Kw;
        for p2c in ["0", "-1", "100000000"] {
            let json = format!(
                r#"{{"alg":"PBES2-HS256+A128KW","enc":"A128CBC-HS256","p2s":"AAAAAAAAAAAAAAAAAAAAAA","p2c":{p2c}}}"#
            );
            let h = header(json.as_bytes());
            let err = unwrap_cek(&key, alg, enc, &[0u8; 24], &h).unwrap_err();
            assert_eq!(err, JoseError::DecryptionFailed, "p2c {p2c}");
        }
    }

    #[test]
    fn ecdh_es_direct_round_trip() {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let point = secret.public_key().to_encoded_point(false);
        let private = Jwk::from_ec_components(
            EcCurve::P256,
            point.x().unwrap(),
            point.y().unwrap(),
            Some(&secret.to_bytes()),
        )
        .unwrap();
        let public = Jwk::from_ec_components(
            EcCurve::P256,
            point.x().unwrap(),
            point.y().unwrap(),
            None,
        )
        .unwrap();

        let enc = EncryptionAlgorithm::A256Gcm;
        let outcome =
            wrap_cek(&public, KeyManagementAlgorithm::EcdhEs, enc, None, None).unwrap();
        assert!(outcome.encrypted_key.is_empty());
        let epk = outcome.extras.epk.unwrap();

        let json = format!(r#"{{"alg":"ECDH-ES","enc":"A256GCM","epk":{}}}"#, epk.to_json());
        let h = header(json.as_bytes());
        let cek = unwrap_cek(&private, KeyManagementAlgorithm::EcdhEs, enc, b"", &h).unwrap();
        assert_eq!(cek.bytes(), outcome.cek.bytes());
    }

    #[test]
    fn ecdh_es_kw_round_trip_with_party_info() {
        let secret = p384::SecretKey::random(&mut rand::rngs::OsRng);
        let point = secret.public_key().to_encoded_point(false);
        let private = Jwk::from_ec_components(
            EcCurve::P384,
            point.x().unwrap(),
            point.y().unwrap(),
            Some(&secret.to_bytes()),
        )
        .unwrap();
        let public = Jwk::from_ec_components(
            EcCurve::P384,
            point.x().unwrap(),
            point.y().unwrap(),
            None,
        )
        .unwrap();

        let enc = EncryptionAlgorithm::A128CbcHs256;
        let alg = KeyManagementAlgorithm::EcdhEsA128Kw;
        let outcome = wrap_cek(&public, alg, enc, Some(b"Alice"), Some(b"Bob")).unwrap();
        let epk = outcome.extras.epk.unwrap();

        let json = format!(
            r#"{{"alg":"ECDH-ES+A128KW","enc":"A128CBC-HS256","epk":{},"apu":"QWxpY2U","apv":"Qm9i"}}"#,
            epk.to_json()
        );
        let h = header(json.as_bytes());
        let cek = unwrap_cek(&private, alg, enc, &outcome.encrypted_key, &h).unwrap();
        assert_eq!(cek.bytes(), outcome.cek.bytes());

        // omitting the party info derives a different KEK
        let json = format!(
            r#"{{"alg":"ECDH-ES+A128KW","enc":"A128CBC-HS256","epk":{}}}"#,
            epk.to_json()
        );
        let h = header(json.as_bytes());
        let err = unwrap_cek(&private, alg, enc, &outcome.encrypted_key, &h).unwrap_err();
        assert_eq!(err, JoseError::DecryptionFailed);
    }

    #[test]
    fn ecdh_curve_mismatch_rejected() {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let point = secret.public_key().to_encoded_point(false);
        let private = Jwk::from_ec_components(
            EcCurve::P256,
            point.x().unwrap(),
            point.y().unwrap(),
            Some(&secret.to_bytes()),
        )
        .unwrap();

        let other = p384::SecretKey::random(&mut rand::rngs::OsRng);
        let other_point = other.public_key().to_encoded_point(false);
        let epk = Jwk::from_ec_components(
            EcCurve::P384,
            other_point.x().unwrap(),
            other_point.y().unwrap(),
            None,
        )
        .unwrap();

        let json = format!(r#"{{"alg":"ECDH-ES","enc":"A256GCM","epk":{}}}"#, epk.to_json());
        let h = header(json.as_bytes());
        let err = unwrap_cek(
            &private,
            KeyManagementAlgorithm::EcdhEs,
            EncryptionAlgorithm::A256Gcm,
            b"",
            &h,
        )
        .unwrap_err();
        assert_eq!(err, JoseError::InvalidHeader("epk"));
    }

    #[test]
    fn rsa_oaep_round_trip() {
        let sk = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        use rsa::traits::{
            PrivateKeyParts,
            PublicKeyParts,
        };
        let primes = sk.primes();
        let key = Jwk::from_rsa_components(
            &sk.n().to_bytes_be(),
            &sk.e().to_bytes_be(),
            Some(&sk.d().to_bytes_be()),
            Some(&primes[0].to_bytes_be()),
            Some(&primes[1].to_bytes_be()),
        );

        let enc = EncryptionAlgorithm::A128Gcm;
        for alg in [
            KeyManagementAlgorithm::Rsa1_5,
            KeyManagementAlgorithm::RsaOaep,
            KeyManagementAlgorithm::RsaOaep256,
        ] {
            let outcome = wrap_cek(&key, alg, enc, None, None).unwrap();
            assert_eq!(outcome.encrypted_key.len(), 256);

            let h = header(br#"{"alg":"RSA-OAEP","enc":"A128GCM"}"#);
            let cek = unwrap_cek(&key, alg, enc, &outcome.encrypted_key, &h).unwrap();
            assert_eq!(cek.bytes(), outcome.cek.bytes(), "alg {alg}");
        }
    }

    #[test]
    fn unwrapped_cek_length_must_match_enc() {
        // a wrapped 16-byte CEK cannot serve A256GCM
        let key = Jwk::from_symmetric(&[7u8; 16]);
        let outcome = wrap_cek(
            &key,
            KeyManagementAlgorithm::A128Kw,
            EncryptionAlgorithm::A128Gcm,
            None,
            None,
        )
        .unwrap();
        let h = header(br#"{"alg":"A128KW","enc":"A256GCM"}"#);
        let err = unwrap_cek(
            &key,
            KeyManagementAlgorithm::A128Kw,
            EncryptionAlgorithm::A256Gcm,
            &outcome.encrypted_key,
            &h,
        )
        .unwrap_err();
        assert_eq!(err, JoseError::DecryptionFailed);
    }
}
