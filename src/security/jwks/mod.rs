//! JWKS key provider.
//!
//! [`JwksKeyProvider`] caches the issuer's signing keys in a lock-free
//! [`ArcSwapOption`] so concurrent verifications read without blocking. Only
//! a cache miss or an expired set triggers a fetch, and fetches are
//! single-flight: resolvers queue on one refresh permit. A resolver that
//! waited while someone else fetched reuses that outcome only when the fetch
//! started after its own lookup missed; a fetch already in flight at that
//! point may predate a rotation, so the resolver fetches again.
//!
//! Lifecycle of the cached set:
//!
//! 1. empty at construction
//! 2. populated by the first resolution (or an explicit [`JwksKeyProvider::refresh`])
//! 3. re-fetched once per miss, so a rotated key is picked up
//! 4. re-fetched on next use once older than the TTL; a failed fetch drops a
//!    stale set and keeps a fresh one

mod fetch;
mod keys;

pub use fetch::{
    parse_key_set, HttpKeySource, KeySource, KeySourceError, DEFAULT_FETCH_TIMEOUT,
    MAX_DOCUMENT_BYTES,
};
pub use keys::{KeyRejected, KeySet, SigningKey};

use crate::security::algorithm::TrustedAlgorithm;
use crate::security::clock::{Clock, SystemClock};
use crate::security::error::AuthorizationFailure;
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default age after which a cached key set is fetched again.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Resolves a signing key by its identifier.
pub trait KeyResolver: Send + Sync {
    /// Find the key for `kid`.
    ///
    /// # Errors
    ///
    /// [`AuthorizationFailure::KeyNotFound`] when no usable key has that
    /// identifier, including when the key set could not be retrieved.
    fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, AuthorizationFailure>;
}

/// Caching, single-flight key provider backed by a [`KeySource`].
pub struct JwksKeyProvider {
    source: Box<dyn KeySource>,
    algorithm: TrustedAlgorithm,
    cache_ttl: Duration,
    clock: Arc<dyn Clock>,
    keys: ArcSwapOption<KeySet>,
    refresh_permit: Mutex<()>,
    // Fetches started, successful or not; bumped under the refresh permit
    fetch_attempts: AtomicU64,
}

impl JwksKeyProvider {
    /// Create a provider that keeps only keys usable with `algorithm`.
    pub fn new(source: impl KeySource + 'static, algorithm: TrustedAlgorithm) -> Self {
        Self {
            source: Box::new(source),
            algorithm,
            cache_ttl: DEFAULT_CACHE_TTL,
            clock: Arc::new(SystemClock),
            keys: ArcSwapOption::empty(),
            refresh_permit: Mutex::new(()),
            fetch_attempts: AtomicU64::new(0),
        }
    }

    /// Provider reading the key set from `url` over HTTP.
    pub fn from_url(
        url: &str,
        algorithm: TrustedAlgorithm,
        timeout: Duration,
    ) -> Result<Self, KeySourceError> {
        Ok(Self::new(HttpKeySource::new(url, timeout)?, algorithm))
    }

    /// Set how long a fetched key set is trusted before it is fetched again.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Use `clock` for key-set age.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Algorithm the cached keys are filtered for.
    pub fn algorithm(&self) -> TrustedAlgorithm {
        self.algorithm
    }

    /// Fetch the key set now, replacing the cache on success.
    ///
    /// Used for eager population at startup. Returns the number of usable keys.
    pub fn refresh(&self) -> Result<usize, KeySourceError> {
        let _permit = self
            .refresh_permit
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.fetch_locked().map(|set| set.len())
    }

    /// Snapshot of the currently cached set, if any.
    pub fn cached(&self) -> Option<Arc<KeySet>> {
        self.keys.load_full()
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetch_attempts.load(Ordering::Acquire)
    }

    /// Drop the cached set; the next resolution fetches.
    pub fn invalidate(&self) {
        self.keys.store(None);
    }

    // Fetch unless the set now holds `kid` or a fetch started after `observed`
    // was read.
    fn refresh_after(&self, kid: &str, observed: u64) -> Option<Arc<KeySet>> {
        let _permit = self
            .refresh_permit
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(set) = self.keys.load_full() {
            if set.get(kid).is_some() && !set.is_stale(self.clock.now(), self.cache_ttl) {
                debug!(kid, "key arrived while waiting for the refresh permit");
                return Some(set);
            }
        }
        if self.fetch_attempts.load(Ordering::Acquire) != observed {
            debug!(kid, "reusing key set fetched after this lookup missed");
            return self.keys.load_full();
        }
        self.fetch_locked().ok()
    }

    // Caller holds the refresh permit.
    fn fetch_locked(&self) -> Result<Arc<KeySet>, KeySourceError> {
        self.fetch_attempts.fetch_add(1, Ordering::AcqRel);
        let started = Instant::now();
        match self.source.fetch() {
            Ok(jwks) => {
                let set = Arc::new(KeySet::from_jwks(&jwks, self.algorithm, self.clock.now()));
                info!(
                    source = %self.source.describe(),
                    keys = set.len(),
                    published = jwks.keys.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "refreshed signing key set"
                );
                self.keys.store(Some(Arc::clone(&set)));
                Ok(set)
            }
            Err(error) => {
                warn!(
                    source = %self.source.describe(),
                    %error,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "signing key set fetch failed"
                );
                let now = self.clock.now();
                if self
                    .keys
                    .load()
                    .as_ref()
                    .is_some_and(|set| set.is_stale(now, self.cache_ttl))
                {
                    self.keys.store(None);
                }
                Err(error)
            }
        }
    }
}

impl KeyResolver for JwksKeyProvider {
    fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, AuthorizationFailure> {
        // Read before the cache; only fetches started after this point are reused
        let observed = self.fetch_attempts.load(Ordering::Acquire);

        if let Some(set) = self.keys.load().as_ref() {
            if !set.is_stale(self.clock.now(), self.cache_ttl) {
                if let Some(key) = set.get(kid) {
                    return Ok(Arc::clone(key));
                }
                debug!(kid, "key not in cached set, re-fetching once");
            } else {
                debug!(kid, "cached key set expired, re-fetching");
            }
        }

        self.refresh_after(kid, observed)
            .and_then(|set| set.get(kid).cloned())
            .ok_or_else(|| AuthorizationFailure::KeyNotFound {
                kid: kid.to_string(),
            })
    }
}

impl<T: KeyResolver + ?Sized> KeyResolver for Arc<T> {
    fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, AuthorizationFailure> {
        (**self).resolve(kid)
    }
}
