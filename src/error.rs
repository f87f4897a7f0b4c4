use thiserror::Error;

/// Errors raised while reading, validating, or writing compact-form tokens.
///
/// The set is closed: cryptographic backend failures are mapped to
/// [`JoseError::SignatureValidationFailed`] or [`JoseError::DecryptionFailed`]
/// at the boundary and never leak through the public API.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum JoseError {
    /// The input is not a well-formed compact token: wrong segment count,
    /// bytes outside the base64url alphabet, or payload bytes that are not
    /// valid JSON where JSON is required.
    #[error("malformed compact token")]
    MalformedToken,

    /// A header parameter is present but unusable (unknown `alg`, non-string
    /// `kid`, `crit` naming an absent member, and so on).
    #[error("invalid header parameter '{0}'")]
    InvalidHeader(&'static str),

    /// A five-segment token did not carry the mandatory `enc` parameter.
    #[error("jwe header is missing the 'enc' parameter")]
    MissingEncryptionAlgorithm,

    /// No configured key or provider produced a candidate for signature
    /// verification.
    #[error("no signature verification key matched the token header")]
    SignatureKeyNotFound,

    /// No configured provider produced a candidate key-management key.
    #[error("no decryption key matched the token header")]
    EncryptionKeyNotFound,

    /// Every candidate key failed to verify the signature, or the token is
    /// unsecured (`alg: none`) without the policy opt-in.
    #[error("signature validation failed")]
    SignatureValidationFailed,

    /// Content-key unwrap or authenticated decryption failed for every
    /// candidate key.
    #[error("decryption failed")]
    DecryptionFailed,

    /// The `zip`-compressed payload could not be inflated.
    #[error("payload decompression failed")]
    DecompressionFailed,

    /// The `exp` claim is in the past (beyond the configured clock skew).
    #[error("token is expired")]
    Expired,

    /// The `nbf` claim is in the future (beyond the configured clock skew).
    #[error("token is not yet valid")]
    NotYetValid,

    /// A claim is present but failed validation (`iss`, `aud`) or a required
    /// claim is absent.
    #[error("invalid claim '{0}'")]
    InvalidClaim(&'static str),

    /// The header lists a critical member the policy has no handler for.
    #[error("no handler registered for critical header '{0}'")]
    CriticalHeaderMissingHandler(String),

    /// A registered critical-header handler rejected the member value.
    #[error("critical header '{0}' rejected by handler")]
    CriticalHeaderRejected(String),

    /// Input exceeds `max_token_size`, or inflation exceeds
    /// `max_decompressed_size`.
    #[error("size limit exceeded")]
    SizeLimitExceeded,

    /// The document's buffer was already returned to the pool; derived
    /// elements are no longer usable.
    #[error("document has been disposed")]
    InstanceInvalidated,
}
