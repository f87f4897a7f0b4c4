//! Raw DEFLATE (RFC 1951) payload compression, no zlib wrapper.
//!
//! Inflation is bounded by the caller: the policy's
//! `max_decompressed_size` caps output growth so a compressed bomb fails
//! fast instead of exhausting memory.

use flate2::{
    Compress,
    Compression,
    Decompress,
    FlushCompress,
    FlushDecompress,
    Status,
};

use crate::error::JoseError;

/// Compresses `input` with raw DEFLATE.
pub(crate) fn deflate(input: &[u8]) -> Result<Vec<u8>, JoseError> {
    let mut state = Compress::new(Compression::default(), false);
    let mut out = Vec::with_capacity(input.len() / 2 + 64);
    loop {
        let consumed = state.total_in() as usize;
        let status = state
            .compress_vec(&input[consumed..], &mut out, FlushCompress::Finish)
            .map_err(|_| JoseError::DecompressionFailed)?;
        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                out.reserve(out.capacity().max(64));
            }
        }
    }
}

/// Inflates raw-DEFLATE `input`, refusing to produce more than
/// `max_len` bytes.
///
/// # Errors
///
/// [`JoseError::SizeLimitExceeded`] when the output would exceed
/// `max_len`; [`JoseError::DecompressionFailed`] on a corrupt or
/// truncated stream.
pub(crate) fn inflate(input: &[u8], max_len: usize) -> Result<Vec<u8>, JoseError> {
    let mut state = Decompress::new(false);
    let mut out = Vec::with_capacity((input.len() * 4).clamp(64, max_len.max(64)));
    loop {
        let consumed = state.total_in() as usize;
        let produced = out.len();
        let status = state
            .decompress_vec(&input[consumed..], &mut out, FlushDecompress::Finish)
            .map_err(|_| JoseError::DecompressionFailed)?;
        if out.len() > max_len {
            return Err(JoseError::SizeLimitExceeded);
        }
        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                if out.len() == out.capacity() {
                    if out.len() >= max_len {
                        return Err(JoseError::SizeLimitExceeded);
                    }
                    // grow toward the bound, never past it
                    let grow = out.capacity().max(64).min(max_len + 1 - out.len());
                    out.reserve(grow);
                } else if state.total_in() as usize == input.len() && out.len() == produced {
                    // no input left and no progress: truncated stream
                    return Err(JoseError::DecompressionFailed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let input = b"a json payload that deflate should shrink shrink shrink shrink";
        let compressed = deflate(input).unwrap();
        let inflated = inflate(&compressed, 1 << 20).unwrap();
        assert_eq!(inflated, input);
    }

    #[test]
    fn highly_repetitive_round_trip() {
        let input = vec![b'a'; 10 * 1024];
        let compressed = deflate(&input).unwrap();
        assert!(compressed.len() < input.len() / 10);
        let inflated = inflate(&compressed, 1 << 20).unwrap();
        assert_eq!(inflated, input);
    }

    #[test]
    fn no_zlib_wrapper() {
        // zlib output would start with 0x78; raw deflate must not
        let compressed = deflate(b"abcabcabc").unwrap();
        assert_ne!(compressed[0], 0x78);
    }

    #[test]
    fn bomb_bounded() {
        let input = vec![0u8; 256 * 1024];
        let compressed = deflate(&input).unwrap();
        let err = inflate(&compressed, 16 * 1024).unwrap_err();
        assert_eq!(err, JoseError::SizeLimitExceeded);
    }

    #[test]
    fn garbage_rejected() {
        let err = inflate(b"\xff\xff\xff\xff not deflate", 1 << 20).unwrap_err();
        assert_eq!(err, JoseError::DecompressionFailed);
    }

    #[test]
    fn truncated_stream_rejected() {
        let compressed = deflate(&vec![b'x'; 4096]).unwrap();
        let err = inflate(&compressed[..compressed.len() / 2], 1 << 20).unwrap_err();
        assert_eq!(err, JoseError::DecompressionFailed);
    }

    #[test]
    fn empty_input_rejected() {
        let err = inflate(b"", 1 << 20).unwrap_err();
        assert_eq!(err, JoseError::DecompressionFailed);
    }
}
