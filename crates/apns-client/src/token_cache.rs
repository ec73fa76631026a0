// Time-boxed memoization of an expensive-to-compute value.
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::error::ApnsResult;

type Producer<V> = Box<dyn Fn() -> ApnsResult<V> + Send + Sync>;

/// Caches a produced value for a validity window, generic over what is
/// cached and how long it stays valid.
///
/// Timestamps are monotonic (`Instant`), so wall-clock adjustments neither
/// invalidate nor extend a cached value.
pub struct TokenCache<V> {
    producer: Producer<V>,
    ttl: Duration,
    slot: RwLock<Option<(V, Instant)>>,
}

impl<V: Clone> TokenCache<V> {
    pub fn new(ttl: Duration, producer: impl Fn() -> ApnsResult<V> + Send + Sync + 'static) -> Self {
        TokenCache {
            producer: Box::new(producer),
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Return the cached value while it is fresh, producing a new one
    /// otherwise.
    ///
    /// Concurrent callers that miss at the same time may each run the
    /// producer; the last writer wins. Values are interchangeable within
    /// their validity window, so this is cheaper than serializing every
    /// caller behind the producer.
    pub fn get(&self) -> ApnsResult<V> {
        if let Some(value) = self.fresh() {
            return Ok(value);
        }
        let value = (self.producer)()?;
        let mut slot = self.slot.write().expect("token cache lock");
        *slot = Some((value.clone(), Instant::now()));
        Ok(value)
    }

    fn fresh(&self) -> Option<V> {
        let slot = self.slot.read().expect("token cache lock");
        match slot.as_ref() {
            Some((value, generated_at)) if generated_at.elapsed() < self.ttl => {
                Some(value.clone())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApnsError;
    use apns_transport::TransportError;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn counting_cache(ttl: Duration) -> (TokenCache<u64>, Arc<AtomicU64>) {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let cache = TokenCache::new(ttl, move || {
            Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
        });
        (cache, calls)
    }

    #[test]
    fn value_is_reused_within_the_ttl() {
        let (cache, calls) = counting_cache(Duration::from_secs(60));
        let first = cache.get().expect("produce");
        let second = cache.get().expect("cached");
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn value_is_regenerated_after_the_ttl() {
        let (cache, calls) = counting_cache(Duration::from_millis(20));
        let first = cache.get().expect("produce");
        std::thread::sleep(Duration::from_millis(40));
        let second = cache.get().expect("regenerate");
        assert_ne!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn producer_errors_are_not_cached() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let cache: TokenCache<u64> = TokenCache::new(Duration::from_secs(60), move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                Err(ApnsError::Transport(TransportError::Closed))
            } else {
                Ok(attempt)
            }
        });

        assert!(cache.get().is_err());
        assert_eq!(cache.get().expect("second attempt succeeds"), 1);
        // A fresh value is now cached.
        assert_eq!(cache.get().expect("cached"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
