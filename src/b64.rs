//! URL-safe, unpadded base64 over caller-supplied buffers.
//!
//! RFC 4648 §5 alphabet (`-` and `_`), no padding. Decoding rejects any
//! byte outside the alphabet and any input length `≡ 1 (mod 4)`.

use base64_simd::URL_SAFE_NO_PAD as b64;

use crate::error::JoseError;

/// Exact encoded length for `n` input bytes.
#[must_use]
pub fn encoded_len(n: usize) -> usize {
    b64.encoded_length(n)
}

/// Upper bound on the decoded length for `n` encoded bytes.
#[must_use]
pub fn decoded_len_estimate(n: usize) -> usize {
    b64.estimated_decoded_length(n)
}

/// Encodes `src` and appends the output to `dst`. Returns bytes written.
pub fn encode_append(src: impl AsRef<[u8]>, dst: &mut String) -> usize {
    let before = dst.len();
    b64.encode_append(src, dst);
    dst.len() - before
}

/// Encodes `src` into a fresh `String`.
#[must_use]
pub fn encode_string(src: impl AsRef<[u8]>) -> String {
    b64.encode_to_string(src)
}

/// Decodes `src` and appends the output to `dst`. Returns bytes written.
///
/// # Errors
///
/// [`JoseError::MalformedToken`] when `src` is not valid unpadded
/// base64url. `dst` is left untouched on failure.
pub fn decode_append(src: &[u8], dst: &mut Vec<u8>) -> Result<usize, JoseError> {
    let before = dst.len();
    if b64.decode_append(src, dst).is_err() {
        dst.truncate(before);
        return Err(JoseError::MalformedToken);
    }
    Ok(dst.len() - before)
}

/// Decodes `src` into a fresh `Vec`.
///
/// # Errors
///
/// [`JoseError::MalformedToken`] when `src` is not valid unpadded
/// base64url.
pub fn decode_vec(src: impl AsRef<[u8]>) -> Result<Vec<u8>, JoseError> {
    b64.decode_to_vec(src).map_err(|_| JoseError::MalformedToken)
}
