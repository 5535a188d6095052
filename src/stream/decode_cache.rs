use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};

use crate::codec::PixelBuffer;
use crate::error::StreamError;

/// Decoded-tile cache scoped to one (level, plane) pass.
///
/// Output tiles that straddle source tile boundaries need the same source
/// tile for two or four adjacent destinations; this cache keeps recently
/// decoded tiles so each distinct source tile is decoded at most once per
/// pass under row-major traversal.
///
/// Deduplication covers in-flight work, not just completed entries:
/// concurrent requests for the same tile elect one loader and the rest wait
/// on a [`Notify`], so a pass driven by several tasks still decodes each
/// tile once. The loader is a closure rather than a wired-in collaborator,
/// which keeps the cache usable from sequential and concurrent drivers
/// alike. A failed load is not stored; the error propagates to the caller
/// and a waiter that finds neither an entry nor a loader becomes the next
/// loader itself.
pub struct TileDecodeCache {
    /// Completed decodes keyed by (tile row, tile column).
    cache: RwLock<LruCache<(u32, u32), PixelBuffer>>,
    /// In-flight decodes for the singleflight pattern.
    in_flight: Mutex<HashMap<(u32, u32), Arc<Notify>>>,
}

impl TileDecodeCache {
    /// Create a cache holding up to `capacity` decoded tiles.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Return the decoded tile for `key`, running `load` at most once per
    /// cache residency.
    ///
    /// `load` is invoked when the tile is neither cached nor in flight; it
    /// must be re-invocable because a waiting task becomes the loader if
    /// the entry it waited for was evicted (or its loader failed) before
    /// the wakeup.
    pub async fn get_or_decode<F, Fut>(
        &self,
        key: (u32, u32),
        load: F,
    ) -> Result<PixelBuffer, StreamError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<PixelBuffer, StreamError>>,
    {
        loop {
            // Fast path: check cache
            {
                let cache = self.cache.read().await;
                if let Some(decoded) = cache.peek(&key) {
                    return Ok(decoded.clone());
                }
            }

            // Slow path: wait on the in-flight loader or become it
            let notify = {
                let mut in_flight = self.in_flight.lock().await;

                if let Some(notify) = in_flight.get(&key) {
                    let notify = notify.clone();
                    // Created before the registry unlocks: notify_waiters
                    // only reaches futures that already exist.
                    let notified = notify.notified();
                    drop(in_flight);
                    notified.await;
                    // Loop back to check the cache
                    continue;
                }

                let notify = Arc::new(Notify::new());
                in_flight.insert(key, notify.clone());
                notify
            };

            let result = load().await;

            // Update cache and in_flight atomically, then notify waiters
            {
                let mut cache = self.cache.write().await;
                let mut in_flight = self.in_flight.lock().await;

                if let Ok(ref decoded) = result {
                    cache.put(key, decoded.clone());
                }

                in_flight.remove(&key);
            }

            notify.notify_waiters();

            return result;
        }
    }
}
