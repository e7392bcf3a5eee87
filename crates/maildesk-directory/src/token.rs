//! Access-token cache with explicit expiry.
//!
//! Token refresh itself lives with the OAuth plumbing outside this crate;
//! callers hand the cache an already-fetched token and a lifetime. The cache
//! takes a [`Clock`] so tests can drive expiry without sleeping.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Shared cache for one directory's access token.
#[derive(Clone)]
pub struct TokenCache {
    inner: Arc<Mutex<Option<CachedToken>>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache").finish_non_exhaustive()
    }
}

impl TokenCache {
    /// Creates an empty cache using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty cache with the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            clock,
        }
    }

    /// Stores a token valid for `ttl_seconds` from now.
    pub fn store(&self, token: impl Into<String>, ttl_seconds: i64) {
        let expires_at = self.clock.now() + Duration::seconds(ttl_seconds);
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(CachedToken {
                value: token.into(),
                expires_at,
            });
        }
    }

    /// Returns the cached token if it has not expired.
    #[must_use]
    pub fn get(&self) -> Option<String> {
        let guard = self.inner.lock().ok()?;
        let cached = guard.as_ref()?;
        if self.clock.now() < cached.expires_at {
            Some(cached.value.clone())
        } else {
            None
        }
    }

    /// Drops any cached token.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = None;
        }
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}
