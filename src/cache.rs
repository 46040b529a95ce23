use crate::utils::{
    clock::{Clock, SystemClock},
    metrics::RESPONSE_CACHE_HITS,
};
use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// A single-slot, fixed-TTL memo.
///
/// [`ResponseCache::get_or_refresh`] returns the stored value while it is
/// younger than the TTL, and otherwise runs the refresh future and stores its
/// output. Errors are passed through and never stored. A zero TTL disables
/// caching entirely.
///
/// The slot lock is never held across an await, so concurrent misses may
/// each run a refresh. The last one to finish wins.
#[derive(Debug)]
pub struct ResponseCache<T> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slot: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> ResponseCache<T> {
    /// Create an empty cache reading the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create an empty cache reading the given clock.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slot: Mutex::new(None),
        }
    }

    /// The configured TTL.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The stored value, if it is still fresh.
    pub fn get(&self) -> Option<T> {
        let now = self.clock.now();
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref()
            .filter(|(cached_at, _)| now.saturating_duration_since(*cached_at) < self.ttl)
            .map(|(_, value)| value.clone())
    }

    /// Overwrite the slot.
    pub fn put(&self, value: T) {
        if self.ttl.is_zero() {
            return;
        }
        let now = self.clock.now();
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some((now, value));
    }

    /// Return the fresh value, or run `refresh` and store what it returns.
    pub async fn get_or_refresh<F, Fut, E>(&self, refresh: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get() {
            metrics::counter!(RESPONSE_CACHE_HITS).increment(1);
            return Ok(value);
        }

        let value = refresh().await?;
        self.put(value.clone());
        Ok(value)
    }
}
