//! Authenticated content encryption: AES-CBC-HMAC composites and AES-GCM.

use aes::cipher::{
    BlockDecryptMut,
    BlockEncryptMut,
    KeyIvInit,
    block_padding::Pkcs7,
};
use aes_gcm::{
    AesGcm,
    Nonce,
    Tag,
    aead::{
        AeadInPlace,
        KeyInit,
        consts::U12,
    },
};
use hmac::{
    Hmac,
    Mac,
};
use sha2::{
    Sha256,
    Sha384,
    Sha512,
};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::{
    alg::EncryptionAlgorithm,
    error::JoseError,
};

type Aes128Gcm = AesGcm<aes::Aes128, U12>;
type Aes192Gcm = AesGcm<aes::Aes192, U12>;
type Aes256Gcm = AesGcm<aes::Aes256, U12>;

/// One authenticated encrypt/decrypt capability bound to a CEK.
///
/// For the CBC-HMAC composites the CEK splits into a MAC half and an
/// encryption half; the tag is the leading half of an HMAC over
/// `aad || iv || ciphertext || len64(aad_bits)`.
#[derive(Debug)]
pub(crate) enum ContentCipher {
    CbcHmac {
        enc: EncryptionAlgorithm,
        mac_key: Vec<u8>,
        enc_key: Vec<u8>,
    },
    Gcm {
        enc: EncryptionAlgorithm,
        key: Vec<u8>,
    },
}

impl ContentCipher {
    /// Binds `cek` to the algorithm. Fails when the key length does not
    /// match the algorithm's geometry.
    pub fn new(enc: EncryptionAlgorithm, cek: &[u8]) -> Result<Self, JoseError> {
        if cek.len() != enc.key_len() {
            return Err(JoseError::DecryptionFailed);
        }
        match enc {
            EncryptionAlgorithm::A128CbcHs256
            | EncryptionAlgorithm::A192CbcHs384
            | EncryptionAlgorithm::A256CbcHs512 => {
                let half = cek.len() / 2;
                Ok(Self::CbcHmac {
                    enc,
                    mac_key: cek[..half].to_vec(),
                    enc_key: cek[half..].to_vec(),
                })
            }
            EncryptionAlgorithm::A128Gcm
            | EncryptionAlgorithm::A192Gcm
            | EncryptionAlgorithm::A256Gcm => Ok(Self::Gcm {
                enc,
                key: cek.to_vec(),
            }),
        }
    }

    /// Encrypts `plaintext`, returning `(ciphertext, tag)`.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), JoseError> {
        match self {
            Self::CbcHmac {
                enc,
                mac_key,
                enc_key,
            } => {
                if nonce.len() != enc.iv_len() {
                    return Err(JoseError::DecryptionFailed);
                }
                let ciphertext = cbc_encrypt(*enc, enc_key, nonce, plaintext)?;
                let tag = cbc_hmac_tag(*enc, mac_key, aad, nonce, &ciphertext)?;
                Ok((ciphertext, tag))
            }
            Self::Gcm { enc, key } => {
                if nonce.len() != enc.iv_len() {
                    return Err(JoseError::DecryptionFailed);
                }
                let mut buffer = plaintext.to_vec();
                let tag = gcm_apply(*enc, key, |cipher| {
                    cipher.encrypt_in_place_detached(Nonce::from_slice(nonce), aad, &mut buffer)
                })?;
                Ok((buffer, tag.to_vec()))
            }
        }
    }

    /// Verifies the tag and decrypts `ciphertext`.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        aad: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, JoseError> {
        match self {
            Self::CbcHmac {
                enc,
                mac_key,
                enc_key,
            } => {
                if nonce.len() != enc.iv_len() || tag.len() != enc.tag_len() {
                    return Err(JoseError::DecryptionFailed);
                }
                // tag first, decrypt only after it checks out
                let mut expected = cbc_hmac_tag(*enc, mac_key, aad, nonce, ciphertext)?;
                let tag_ok = bool::from(expected.ct_eq(tag));
                expected.zeroize();
                if !tag_ok {
                    return Err(JoseError::DecryptionFailed);
                }
                cbc_decrypt(*enc, enc_key, nonce, ciphertext)
            }
            Self::Gcm { enc, key } => {
                if nonce.len() != enc.iv_len() || tag.len() != enc.tag_len() {
                    return Err(JoseError::DecryptionFailed);
                }
                let mut buffer = ciphertext.to_vec();
                gcm_apply(*enc, key, |cipher| {
                    cipher
                        .decrypt_in_place_detached(
                            Nonce::from_slice(nonce),
                            aad,
                            &mut buffer,
                            Tag::from_slice(tag),
                        )
                        .map(|()| Tag::default())
                })?;
                Ok(buffer)
            }
        }
    }
}

impl Drop for ContentCipher {
    fn drop(&mut self) {
        match self {
            Self::CbcHmac {
                mac_key, enc_key, ..
            } => {
                mac_key.zeroize();
                enc_key.zeroize();
            }
            Self::Gcm { key, .. } => key.zeroize(),
        }
    }
}

fn cbc_encrypt(
    enc: EncryptionAlgorithm,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, JoseError> {
    macro_rules! run {
        ($cipher:ty) => {
            cbc::Encryptor::<$cipher>::new_from_slices(key, iv)
                .map(|enc| enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
                .map_err(|_| JoseError::DecryptionFailed)
        };
    }
    match enc {
        EncryptionAlgorithm::A128CbcHs256 => run!(aes::Aes128),
        EncryptionAlgorithm::A192CbcHs384 => run!(aes::Aes192),
        EncryptionAlgorithm::A256CbcHs512 => run!(aes::Aes256),
        _ => Err(JoseError::DecryptionFailed),
    }
}

fn cbc_decrypt(
    enc: EncryptionAlgorithm,
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, JoseError> {
    macro_rules! run {
        ($cipher:ty) => {
            cbc::Decryptor::<$cipher>::new_from_slices(key, iv)
                .map_err(|_| JoseError::DecryptionFailed)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| JoseError::DecryptionFailed)
        };
    }
    match enc {
        EncryptionAlgorithm::A128CbcHs256 => run!(aes::Aes128),
        EncryptionAlgorithm::A192CbcHs384 => run!(aes::Aes192),
        EncryptionAlgorithm::A256CbcHs512 => run!(aes::Aes256),
        _ => Err(JoseError::DecryptionFailed),
    }
}

/// RFC 7518 §5.2.2.1: HMAC over `aad || iv || ciphertext || len64` where
/// `len64` is the big-endian bit length of the AAD, truncated to the
/// leading half of the digest.
fn cbc_hmac_tag(
    enc: EncryptionAlgorithm,
    mac_key: &[u8],
    aad: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let aad_bits = (aad.len() as u64) * 8;
    macro_rules! run {
        ($digest:ty) => {{
            let mut mac = <Hmac<$digest> as Mac>::new_from_slice(mac_key)
                .map_err(|_| JoseError::DecryptionFailed)?;
            mac.update(aad);
            mac.update(iv);
            mac.update(ciphertext);
            mac.update(&aad_bits.to_be_bytes());
            let full = mac.finalize().into_bytes();
            Ok(full[..enc.tag_len()].to_vec())
        }};
    }
    match enc {
        EncryptionAlgorithm::A128CbcHs256 => run!(Sha256),
        EncryptionAlgorithm::A192CbcHs384 => run!(Sha384),
        EncryptionAlgorithm::A256CbcHs512 => run!(Sha512),
        _ => Err(JoseError::DecryptionFailed),
    }
}

fn gcm_apply(
    enc: EncryptionAlgorithm,
    key: &[u8],
    op: impl FnOnce(&dyn GcmOp) -> Result<Tag, aes_gcm::Error>,
) -> Result<Tag, JoseError> {
    macro_rules! run {
        ($cipher:ty) => {{
            let cipher =
                <$cipher>::new_from_slice(key).map_err(|_| JoseError::DecryptionFailed)?;
            op(&cipher).map_err(|_| JoseError::DecryptionFailed)
        }};
    }
    match enc {
        EncryptionAlgorithm::A128Gcm => run!(Aes128Gcm),
        EncryptionAlgorithm::A192Gcm => run!(Aes192Gcm),
        EncryptionAlgorithm::A256Gcm => run!(Aes256Gcm),
        _ => Err(JoseError::DecryptionFailed),
    }
}

/// Object-safe view over the three GCM widths.
trait GcmOp {
    fn encrypt_in_place_detached(
        &self,
        nonce: &Nonce<U12>,
        aad: &[u8],
        buffer: &mut Vec<u8>,
    ) -> Result<Tag, aes_gcm::Error>;

    fn decrypt_in_place_detached(
        &self,
        nonce: &Nonce<U12>,
        aad: &[u8],
        buffer: &mut Vec<u8>,
        tag: &Tag,
    ) -> Result<(), aes_gcm::Error>;
}

macro_rules! impl_gcm_op {
    ($cipher:ty) => {
        impl GcmOp for $cipher {
            fn encrypt_in_place_detached(
                &self,
                nonce: &Nonce<U12>,
                aad: &[u8],
                buffer: &mut Vec<u8>,
            ) -> Result<Tag, aes_gcm::Error> {
                AeadInPlace::encrypt_in_place_detached(self, nonce, aad, buffer)
            }

            fn decrypt_in_place_detached(
                &self,
                nonce: &Nonce<U12>,
                aad: &[u8],
                buffer: &mut Vec<u8>,
                tag: &Tag,
            ) -> Result<(), aes_gcm::Error> {
                AeadInPlace::decrypt_in_place_detached(self, nonce, aad, buffer, tag)
            }
        }
    };
}

impl_gcm_op!(Aes128Gcm);
impl_gcm_op!(Aes192Gcm);
impl_gcm_op!(Aes256Gcm);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbc_hmac_round_trip() {
        let cek: Vec<u8> = (0..32).collect();
        let cipher = ContentCipher::new(EncryptionAlgorithm::A128CbcHs256, &cek).unwrap();
        let nonce = [9u8; 16];

        let (ct, tag) = cipher.encrypt(b"hello world", &nonce, b"aad-bytes").unwrap();
        assert_eq!(tag.len(), 16);
        assert_eq!(ct.len() % 16, 0);

        let plain = cipher.decrypt(&ct, &nonce, b"aad-bytes", &tag).unwrap();
        assert_eq!(plain, b"hello world");
    }

    #[test]
    fn cbc_hmac_rfc7518_appendix_b1_vector() {
        // RFC 7518 B.1: AES_128_CBC_HMAC_SHA_256
        let key = hex::decode(
            "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f",
        )
        .unwrap();
        let plaintext = hex::decode(
            "41206369706865722073797374656d206d757374206e6f742062652072657175\
             6972656420746f206265207365637265742c20616e64206974206d7573742062\
             652061626c6520746f2066616c6c20696e746f207468652068616e6473206f66\
             2074686520656e656d7920776974686f757420696e636f6e76656e69656e6365",
        )
        .unwrap();
        let iv = hex::decode("1af38c2dc2b96ffdd86694092341bc04").unwrap();
        let aad = hex::decode(
            "546865207365636f6e64207072696e6369706c65206f662041756775737465\
             204b6572636b686f666673",
        )
        .unwrap();
        let expected_ct = hex::decode(
            "c80edfa32ddf39d5ef00c0b468834279a2e46a1b8049f792f76bfe54b903a9c9\
             a94ac9b47ad2655c5f10f9aef71427e2fc6f9b3f399a221489f16362c7032336\
             09d45ac69864e3321cf82935ac4096c86e133314c54019e8ca7980dfa4b9cf1b\
             384c486f3a54c51078158ee5d79de59fbd34d848b3d69550a67646344427ade5\
             4b8851ffb598f7f80074b9473c82e2db",
        )
        .unwrap();
        let expected_tag = hex::decode("652c3fa36b0a7c5b3219fab3a30bc1c4").unwrap();

        let cipher = ContentCipher::new(EncryptionAlgorithm::A128CbcHs256, &key).unwrap();
        let (ct, tag) = cipher.encrypt(&plaintext, &iv, &aad).unwrap();
        assert_eq!(ct, expected_ct);
        assert_eq!(tag, expected_tag);

        let round = cipher.decrypt(&ct, &iv, &aad, &tag).unwrap();
        assert_eq!(round, plaintext);
    }

    #[test]
    fn cbc_hmac_tamper_detected() {
        let cek: Vec<u8> = (0..32).collect();
        let cipher = ContentCipher::new(EncryptionAlgorithm::A128CbcHs256, &cek).unwrap();
        let nonce = [0u8; 16];
        let (mut ct, mut tag) = cipher.encrypt(b"hi", &nonce, b"aad").unwrap();

        ct[0] ^= 1;
        assert_eq!(
            cipher.decrypt(&ct, &nonce, b"aad", &tag).unwrap_err(),
            JoseError::DecryptionFailed
        );
        ct[0] ^= 1;

        tag[15] ^= 1;
        assert_eq!(
            cipher.decrypt(&ct, &nonce, b"aad", &tag).unwrap_err(),
            JoseError::DecryptionFailed
        );
        tag[15] ^= 1;

        // AAD binding
        assert_eq!(
            cipher.decrypt(&ct, &nonce, b"tampered", &tag).unwrap_err(),
            JoseError::DecryptionFailed
        );
    }

    #[test]
    fn gcm_round_trip_all_widths() {
        for (enc, key_len) in [
            (EncryptionAlgorithm::A128Gcm, 16),
            (EncryptionAlgorithm::A192Gcm, 24),
            (EncryptionAlgorithm::A256Gcm, 32),
        ] {
            let cek = vec![3u8; key_len];
            let cipher = ContentCipher::new(enc, &cek).unwrap();
            let nonce = [5u8; 12];

            let (ct, tag) = cipher.encrypt(b"payload", &nonce, b"aad").unwrap();
            assert_eq!(tag.len(), 16);
            assert_eq!(ct.len(), 7);

            let plain = cipher.decrypt(&ct, &nonce, b"aad", &tag).unwrap();
            assert_eq!(plain, b"payload");

            let mut bad = tag.clone();
            bad[0] ^= 1;
            assert_eq!(
                cipher.decrypt(&ct, &nonce, b"aad", &bad).unwrap_err(),
                JoseError::DecryptionFailed
            );
        }
    }

    #[test]
    fn wrong_key_length_rejected() {
        assert_eq!(
            ContentCipher::new(EncryptionAlgorithm::A128CbcHs256, &[0u8; 16]).unwrap_err(),
            JoseError::DecryptionFailed
        );
        assert_eq!(
            ContentCipher::new(EncryptionAlgorithm::A128Gcm, &[0u8; 32]).unwrap_err(),
            JoseError::DecryptionFailed
        );
    }

    #[test]
    fn wrong_nonce_length_rejected() {
        let cipher = ContentCipher::new(EncryptionAlgorithm::A128Gcm, &[0u8; 16]).unwrap();
        assert_eq!(
            cipher.encrypt(b"x", &[0u8; 16], b"").unwrap_err(),
            JoseError::DecryptionFailed
        );
    }
}
