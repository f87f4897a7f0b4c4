//! Registered-claim validation: lifetime, issuer, audience.
//!
//! Time-valued claims are NumericDate integers (seconds since epoch).
//! Checks run in the pipeline's fixed order: `exp`, `nbf`, `iss`, `aud`;
//! the first failure wins.

use crate::{
    document::audiences_of,
    error::JoseError,
    json::JsonIndex,
    policy::ValidationPolicy,
};

pub(crate) fn validate_claims(
    buf: &[u8],
    index: &JsonIndex,
    policy: &ValidationPolicy,
) -> Result<(), JoseError> {
    let root = index.root();
    let now = policy.now();
    let skew = policy.clock_skew();

    match index.member(buf, root, b"exp") {
        None => {
            if policy.require_exp() {
                return Err(JoseError::InvalidClaim("exp"));
            }
        }
        Some(node) => {
            let exp = index
                .i64_value(buf, node)
                .ok_or(JoseError::InvalidClaim("exp"))?;
            if now > exp.saturating_add(skew) {
                return Err(JoseError::Expired);
            }
        }
    }

    match index.member(buf, root, b"nbf") {
        None => {
            if policy.require_nbf() {
                return Err(JoseError::InvalidClaim("nbf"));
            }
        }
        Some(node) => {
            let nbf = index
                .i64_value(buf, node)
                .ok_or(JoseError::InvalidClaim("nbf"))?;
            if now.saturating_add(skew) < nbf {
                return Err(JoseError::NotYetValid);
            }
        }
    }

    if !policy.issuers().is_empty() {
        let issuer = index
            .member(buf, root, b"iss")
            .and_then(|node| index.str_value(buf, node))
            .ok_or(JoseError::InvalidClaim("iss"))?;
        if !policy.issuers().contains(issuer.as_ref()) {
            return Err(JoseError::InvalidClaim("iss"));
        }
    }

    if !policy.audiences().is_empty() {
        let accepted = audiences_of(buf, index)
            .iter()
            .any(|aud| policy.audiences().contains(aud.as_ref()));
        if !accepted {
            return Err(JoseError::InvalidClaim("aud"));
        }
    }

    Ok(())
}
