//! Validation policy: what a token must satisfy before a document is
//! handed to the caller.
//!
//! Policies are built once, are immutable afterwards, and are safe to
//! share across threads. Key distribution is a seam: implement
//! [`KeyProvider`] to resolve keys from wherever they live.

use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
    time::{
        SystemTime,
        UNIX_EPOCH,
    },
};

use crate::{
    alg::{
        EncryptionAlgorithm,
        KeyManagementAlgorithm,
        SignatureAlgorithm,
    },
    error::JoseError,
    header::JwtHeader,
    jwk::Jwk,
};

const DEFAULT_MAX_TOKEN_SIZE: usize = 256 * 1024;
const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 1024 * 1024;

static POLICY_IDS: AtomicU64 = AtomicU64::new(1);

/// Resolves candidate keys for a token header.
///
/// A provider returns zero or more keys that may match; the reader
/// filters by capability and tries `kid` matches first.
pub trait KeyProvider: Send + Sync {
    fn resolve_keys(&self, header: &JwtHeader) -> Vec<Jwk>;
}

/// Provider that unconditionally offers a single key.
pub struct StaticKeyProvider {
    key: Jwk,
}

impl StaticKeyProvider {
    #[must_use]
    pub fn new(key: Jwk) -> Self {
        Self { key }
    }
}

impl KeyProvider for StaticKeyProvider {
    fn resolve_keys(&self, _: &JwtHeader) -> Vec<Jwk> {
        vec![self.key.clone()]
    }
}

/// In-memory JWK set provider. When the header carries a `kid`, only
/// keys with that `kid` (or no `kid` at all) are offered.
pub struct KeySetProvider {
    keys: Vec<Jwk>,
}

impl KeySetProvider {
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = Jwk>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

impl KeyProvider for KeySetProvider {
    fn resolve_keys(&self, header: &JwtHeader) -> Vec<Jwk> {
        match header.kid() {
            Some(kid) => self
                .keys
                .iter()
                .filter(|key| key.kid().is_none_or(|k| k == kid))
                .cloned()
                .collect(),
            None => self.keys.clone(),
        }
    }
}

/// Approves or rejects one critical header member.
pub trait CriticalHeaderHandler: Send + Sync {
    /// `value` is the raw JSON text of the member (quotes included for
    /// strings). Return `false` to reject the token.
    fn approve(&self, name: &str, value: &[u8]) -> bool;
}

impl<F> CriticalHeaderHandler for F
where
    F: Fn(&str, &[u8]) -> bool + Send + Sync,
{
    fn approve(&self, name: &str, value: &[u8]) -> bool {
        self(name, value)
    }
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Immutable bundle of validation requirements.
pub struct ValidationPolicy {
    id: u64,
    signature_keys: Vec<Jwk>,
    signature_providers: Vec<Box<dyn KeyProvider>>,
    accepted_signature_algorithms: Option<HashSet<SignatureAlgorithm>>,
    decryption_keys: Vec<Jwk>,
    decryption_providers: Vec<Box<dyn KeyProvider>>,
    require_exp: bool,
    require_nbf: bool,
    clock_skew: i64,
    audiences: HashSet<String>,
    issuers: HashSet<String>,
    crit_handlers: HashMap<String, Box<dyn CriticalHeaderHandler>>,
    max_token_size: usize,
    max_decompressed_size: usize,
    ignore_nested_token: bool,
    allow_unsecured: bool,
    header_cache_enabled: bool,
    clock: Clock,
}

impl ValidationPolicy {
    #[must_use]
    pub fn builder() -> ValidationPolicyBuilder {
        ValidationPolicyBuilder::new()
    }

    /// Distinguishes policies for header-cache crit memoization.
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn max_token_size(&self) -> usize {
        self.max_token_size
    }

    pub(crate) fn max_decompressed_size(&self) -> usize {
        self.max_decompressed_size
    }

    pub(crate) fn ignore_nested_token(&self) -> bool {
        self.ignore_nested_token
    }

    pub(crate) fn allow_unsecured(&self) -> bool {
        self.allow_unsecured
    }

    pub(crate) fn header_cache_enabled(&self) -> bool {
        self.header_cache_enabled
    }

    pub(crate) fn now(&self) -> i64 {
        (self.clock)()
    }

    pub(crate) fn clock_skew(&self) -> i64 {
        self.clock_skew
    }

    pub(crate) fn require_exp(&self) -> bool {
        self.require_exp
    }

    pub(crate) fn require_nbf(&self) -> bool {
        self.require_nbf
    }

    pub(crate) fn audiences(&self) -> &HashSet<String> {
        &self.audiences
    }

    pub(crate) fn issuers(&self) -> &HashSet<String> {
        &self.issuers
    }

    pub(crate) fn accepts_signature_algorithm(&self, alg: SignatureAlgorithm) -> bool {
        self.accepted_signature_algorithms
            .as_ref()
            .is_none_or(|set| set.contains(&alg))
    }

    /// Candidate verification keys, `kid` matches first, capability
    /// filtered.
    pub(crate) fn signature_candidates(
        &self,
        header: &JwtHeader,
        alg: SignatureAlgorithm,
    ) -> Vec<Jwk> {
        let mut pool: Vec<Jwk> = self.signature_keys.clone();
        for provider in &self.signature_providers {
            pool.extend(provider.resolve_keys(header));
        }
        order_candidates(pool, header, |key| key.supports_signature(alg))
    }

    /// Candidate decryption keys, `kid` matches first, capability
    /// filtered.
    pub(crate) fn decryption_candidates(
        &self,
        header: &JwtHeader,
        alg: KeyManagementAlgorithm,
        enc: EncryptionAlgorithm,
    ) -> Vec<Jwk> {
        let mut pool: Vec<Jwk> = self.decryption_keys.clone();
        for provider in &self.decryption_providers {
            pool.extend(provider.resolve_keys(header));
        }
        order_candidates(pool, header, |key| key.supports_key_management(alg, enc))
    }

    /// Enforces the `crit` contract: every listed name must be a member,
    /// have a registered handler, and be approved by it.
    pub(crate) fn check_critical_headers(&self, header: &JwtHeader) -> Result<(), JoseError> {
        for name in header.crit() {
            if !header.has_member(&name) {
                return Err(JoseError::InvalidHeader("crit"));
            }
            let Some(handler) = self.crit_handlers.get(name.as_ref()) else {
                return Err(JoseError::CriticalHeaderMissingHandler(name.into_owned()));
            };
            let value = header
                .member_raw_value(&name)
                .ok_or(JoseError::InvalidHeader("crit"))?;
            if !handler.approve(&name, value) {
                return Err(JoseError::CriticalHeaderRejected(name.into_owned()));
            }
        }
        Ok(())
    }
}

fn order_candidates(
    pool: Vec<Jwk>,
    header: &JwtHeader,
    supports: impl Fn(&Jwk) -> bool,
) -> Vec<Jwk> {
    let kid = header.kid();
    let mut matched = Vec::new();
    let mut rest = Vec::new();
    for key in pool {
        if !supports(&key) {
            continue;
        }
        let kid_match = match (&kid, key.kid()) {
            (Some(wanted), Some(have)) => wanted == have,
            _ => false,
        };
        if kid_match {
            matched.push(key);
        } else {
            rest.push(key);
        }
    }
    matched.extend(rest);
    matched
}

/// Chained builder for [`ValidationPolicy`].
pub struct ValidationPolicyBuilder {
    policy: ValidationPolicy,
}

impl ValidationPolicyBuilder {
    fn new() -> Self {
        Self {
            policy: ValidationPolicy {
                id: POLICY_IDS.fetch_add(1, Ordering::Relaxed),
                signature_keys: Vec::new(),
                signature_providers: Vec::new(),
                accepted_signature_algorithms: None,
                decryption_keys: Vec::new(),
                decryption_providers: Vec::new(),
                require_exp: false,
                require_nbf: false,
                clock_skew: 0,
                audiences: HashSet::new(),
                issuers: HashSet::new(),
                crit_handlers: HashMap::new(),
                max_token_size: DEFAULT_MAX_TOKEN_SIZE,
                max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
                ignore_nested_token: false,
                allow_unsecured: false,
                header_cache_enabled: true,
                clock: Box::new(system_now),
            },
        }
    }

    /// Adds an acceptable verification key.
    #[must_use]
    pub fn with_signature_key(mut self, key: Jwk) -> Self {
        self.policy.signature_keys.push(key);
        self
    }

    /// Adds a verification-key provider.
    #[must_use]
    pub fn with_signature_key_provider(
        mut self,
        provider: impl KeyProvider + 'static,
    ) -> Self {
        self.policy.signature_providers.push(Box::new(provider));
        self
    }

    /// Restricts acceptable signature algorithms. Without this, any
    /// registry algorithm a candidate key supports is acceptable.
    #[must_use]
    pub fn with_accepted_signature_algorithms(
        mut self,
        algs: impl IntoIterator<Item = SignatureAlgorithm>,
    ) -> Self {
        self.policy.accepted_signature_algorithms = Some(algs.into_iter().collect());
        self
    }

    /// Adds an acceptable decryption key.
    #[must_use]
    pub fn with_decryption_key(mut self, key: Jwk) -> Self {
        self.policy.decryption_keys.push(key);
        self
    }

    /// Adds a decryption-key provider. Providers are consulted in
    /// registration order.
    #[must_use]
    pub fn with_decryption_key_provider(
        mut self,
        provider: impl KeyProvider + 'static,
    ) -> Self {
        self.policy.decryption_providers.push(Box::new(provider));
        self
    }

    /// Rejects tokens without an `exp` claim.
    #[must_use]
    pub fn require_expiration(mut self) -> Self {
        self.policy.require_exp = true;
        self
    }

    /// Rejects tokens without an `nbf` claim.
    #[must_use]
    pub fn require_not_before(mut self) -> Self {
        self.policy.require_nbf = true;
        self
    }

    /// Clock skew tolerated by lifetime checks, in seconds.
    #[must_use]
    pub fn with_clock_skew(mut self, seconds: i64) -> Self {
        self.policy.clock_skew = seconds.max(0);
        self
    }

    /// Accepts tokens whose `aud` contains any of the given audiences.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.policy.audiences.insert(audience.into());
        self
    }

    /// Accepts tokens issued by any of the given issuers.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.policy.issuers.insert(issuer.into());
        self
    }

    /// Registers a handler for a critical header name.
    #[must_use]
    pub fn with_critical_header_handler(
        mut self,
        name: impl Into<String>,
        handler: impl CriticalHeaderHandler + 'static,
    ) -> Self {
        self.policy.crit_handlers.insert(name.into(), Box::new(handler));
        self
    }

    /// Caps accepted token size in bytes; larger inputs fail before any
    /// decoding.
    #[must_use]
    pub fn with_max_token_size(mut self, bytes: usize) -> Self {
        self.policy.max_token_size = bytes;
        self
    }

    /// Caps inflated payload size for `zip` tokens.
    #[must_use]
    pub fn with_max_decompressed_size(mut self, bytes: usize) -> Self {
        self.policy.max_decompressed_size = bytes;
        self
    }

    /// Returns decrypted payloads raw instead of recursing into
    /// `cty: JWT`.
    #[must_use]
    pub fn ignore_nested_token(mut self) -> Self {
        self.policy.ignore_nested_token = true;
        self
    }

    /// Accepts unsecured (`alg: none`) tokens. Off by default; never
    /// inferred.
    #[must_use]
    pub fn allow_unsecured(mut self) -> Self {
        self.policy.allow_unsecured = true;
        self
    }

    /// Disables the shared header cache for tokens read under this
    /// policy.
    #[must_use]
    pub fn without_header_cache(mut self) -> Self {
        self.policy.header_cache_enabled = false;
        self
    }

    /// Injects the clock used for lifetime checks (seconds since epoch).
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.policy.clock = Box::new(clock);
        self
    }

    #[must_use]
    pub fn build(self) -> ValidationPolicy {
        self.policy
    }
}

fn system_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(json: &[u8]) -> JwtHeader {
        JwtHeader::parse(json.to_vec()).unwrap()
    }

    #[test]
    fn kid_matches_ordered_first() {
        let header = header(br#"{"alg":"HS256","kid":"b"}"#);
        let policy = ValidationPolicy::builder()
            .with_signature_key(Jwk::from_symmetric(&[1u8; 32]).with_kid("a"))
            .with_signature_key(Jwk::from_symmetric(&[2u8; 32]).with_kid("b"))
            .with_signature_key(Jwk::from_symmetric(&[3u8; 32]))
            .build();

        let candidates = policy.signature_candidates(&header, SignatureAlgorithm::HS256);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].kid(), Some("b"));
    }

    #[test]
    fn incapable_keys_filtered_out() {
        let header = header(br#"{"alg":"HS512"}"#);
        let policy = ValidationPolicy::builder()
            .with_signature_key(Jwk::from_symmetric(&[1u8; 32]))
            .with_signature_key(Jwk::from_symmetric(&[2u8; 64]))
            .build();

        let candidates = policy.signature_candidates(&header, SignatureAlgorithm::HS512);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].symmetric_key().unwrap().len(), 64);
    }

    #[test]
    fn provider_keys_follow_policy_keys() {
        let header = header(br#"{"alg":"HS256"}"#);
        let policy = ValidationPolicy::builder()
            .with_signature_key_provider(StaticKeyProvider::new(Jwk::from_symmetric(
                &[9u8; 32],
            )))
            .build();

        let candidates = policy.signature_candidates(&header, SignatureAlgorithm::HS256);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn key_set_provider_prefilters_kid() {
        let provider = KeySetProvider::new([
            Jwk::from_symmetric(&[1u8; 32]).with_kid("a"),
            Jwk::from_symmetric(&[2u8; 32]).with_kid("b"),
            Jwk::from_symmetric(&[3u8; 32]),
        ]);

        let keys = provider.resolve_keys(&header(br#"{"alg":"HS256","kid":"a"}"#));
        assert_eq!(keys.len(), 2); // kid "a" plus the kid-less catch-all

        let keys = provider.resolve_keys(&header(br#"{"alg":"HS256"}"#));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn crit_contract() {
        let with_handler = ValidationPolicy::builder()
            .with_critical_header_handler("urn:example:acme", |_: &str, value: &[u8]| {
                value == b"\"ok\""
            })
            .build();
        let bare = ValidationPolicy::builder().build();

        let h = header(br#"{"alg":"HS256","crit":["urn:example:acme"],"urn:example:acme":"ok"}"#);
        with_handler.check_critical_headers(&h).unwrap();
        assert_eq!(
            bare.check_critical_headers(&h).unwrap_err(),
            JoseError::CriticalHeaderMissingHandler("urn:example:acme".into())
        );

        let h = header(br#"{"alg":"HS256","crit":["urn:example:acme"],"urn:example:acme":"no"}"#);
        assert_eq!(
            with_handler.check_critical_headers(&h).unwrap_err(),
            JoseError::CriticalHeaderRejected("urn:example:acme".into())
        );

        // a crit name with no matching member is malformed
        let h = header(br#"{"alg":"HS256","crit":["urn:example:acme"]}"#);
        assert_eq!(
            with_handler.check_critical_headers(&h).unwrap_err(),
            JoseError::InvalidHeader("crit")
        );
    }

    #[test]
    fn accepted_algorithm_restriction() {
        let open = ValidationPolicy::builder().build();
        assert!(open.accepts_signature_algorithm(SignatureAlgorithm::HS256));

        let restricted = ValidationPolicy::builder()
            .with_accepted_signature_algorithms([SignatureAlgorithm::ES256])
            .build();
        assert!(restricted.accepts_signature_algorithm(SignatureAlgorithm::ES256));
        assert!(!restricted.accepts_signature_algorithm(SignatureAlgorithm::HS256));
    }

    #[test]
    fn injected_clock() {
        let policy = ValidationPolicy::builder().with_clock(|| 1234).build();
        assert_eq!(policy.now(), 1234);
    }

    #[test]
    fn policies_have_distinct_ids() {
        let a = ValidationPolicy::builder().build();
        let b = ValidationPolicy::builder().build();
        assert_ne!(a.id(), b.id());
    }
}
