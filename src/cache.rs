//! Bounded, content-addressed cache of parsed headers.
//!
//! Keys are the exact base64url header bytes as they appeared on the
//! wire; values are the parsed header plus a memo of the last
//! critical-header evaluation, stamped with the policy that produced it
//! so a different policy recomputes instead of trusting a stale verdict.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        LazyLock,
        Mutex,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
};

use crate::{
    error::JoseError,
    header::JwtHeader,
};

const DEFAULT_CAPACITY: usize = 32;

static GLOBAL: LazyLock<HeaderCache> = LazyLock::new(|| HeaderCache::new(DEFAULT_CAPACITY));

/// A parsed header plus its per-policy critical-header memo.
#[derive(Debug)]
pub(crate) struct CachedHeader {
    pub header: JwtHeader,
    crit: Mutex<Option<CritMemo>>,
}

#[derive(Debug, Clone)]
struct CritMemo {
    policy_id: u64,
    outcome: Result<(), JoseError>,
}

impl CachedHeader {
    pub fn new(header: JwtHeader) -> Self {
        Self {
            header,
            crit: Mutex::new(None),
        }
    }

    /// Returns the memoized critical-header outcome for `policy_id`,
    /// computing and storing it when the memo is absent or belongs to a
    /// different policy.
    pub fn crit_outcome(
        &self,
        policy_id: u64,
        compute: impl FnOnce(&JwtHeader) -> Result<(), JoseError>,
    ) -> Result<(), JoseError> {
        if let Ok(memo) = self.crit.lock() {
            if let Some(memo) = memo.as_ref() {
                if memo.policy_id == policy_id {
                    return memo.outcome.clone();
                }
            }
        }
        let outcome = compute(&self.header);
        if let Ok(mut memo) = self.crit.lock() {
            *memo = Some(CritMemo {
                policy_id,
                outcome: outcome.clone(),
            });
        }
        outcome
    }
}

struct Entry {
    value: Arc<CachedHeader>,
    touched: u64,
}

/// Bounded LRU keyed by raw base64url header bytes. Thread-safe.
pub(crate) struct HeaderCache {
    entries: Mutex<HashMap<Box<[u8]>, Entry>>,
    capacity: usize,
    tick: AtomicU64,
}

impl HeaderCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
            tick: AtomicU64::new(0),
        }
    }

    pub fn global() -> &'static Self {
        &GLOBAL
    }

    pub fn lookup(&self, key: &[u8]) -> Option<Arc<CachedHeader>> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get_mut(key)?;
        entry.touched = self.tick.fetch_add(1, Ordering::Relaxed);
        Some(Arc::clone(&entry.value))
    }

    pub fn insert(&self, key: &[u8], value: Arc<CachedHeader>) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.len() >= self.capacity && !entries.contains_key(key) {
            // evict the stalest entry; at this capacity a scan is cheap
            if let Some(stalest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&stalest);
            }
        }
        entries.insert(
            key.into(),
            Entry {
                value,
                touched: self.tick.fetch_add(1, Ordering::Relaxed),
            },
        );
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}
