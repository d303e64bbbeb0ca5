//! TTL cache with single-flight request deduplication.
//!
//! `get_or_fetch` collapses concurrent identical lookups into one call:
//! the first caller runs the fetcher, every concurrent caller with the
//! same key awaits the same shared future. Successful results are cached
//! with a time-to-live; failures are handed to every waiter of that
//! flight but never cached, so the next caller retries.
//!
//! Keys must be a deterministic function of the request's semantic
//! parameters — two logically identical requests collide here regardless
//! of call order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Fetch failures are shared between all waiters of one flight.
pub type SharedError = Arc<anyhow::Error>;

type InFlight<T> = Shared<BoxFuture<'static, Result<T, SharedError>>>;

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    in_flight: HashMap<String, InFlight<T>>,
}

pub struct RequestCache<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for RequestCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
}

impl<T> Default for RequestCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            })),
        }
    }

    /// Return the cached value for `key`, join an in-flight fetch for it,
    /// or run `fetcher` and cache its result for `ttl`.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetcher: F,
    ) -> Result<T, SharedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let flight = {
            let mut inner = self.inner.lock().await;

            if let Some(entry) = inner.entries.get(key) {
                if entry.expires_at > Instant::now() {
                    trace!("cache hit for '{}'", key);
                    return Ok(entry.value.clone());
                }
            }

            if let Some(flight) = inner.in_flight.get(key) {
                debug!("joining in-flight fetch for '{}'", key);
                flight.clone()
            } else {
                debug!("fetching '{}'", key);
                let shared_inner = Arc::clone(&self.inner);
                let owned_key = key.to_string();
                let fut = fetcher();
                let flight: InFlight<T> = async move {
                    let result = fut.await;
                    // The in-flight marker is cleared and the entry stored
                    // under one lock acquisition, before either outcome is
                    // observable to a new caller.
                    let mut inner = shared_inner.lock().await;
                    inner.in_flight.remove(&owned_key);
                    match result {
                        Ok(value) => {
                            inner.entries.insert(
                                owned_key,
                                CacheEntry {
                                    value: value.clone(),
                                    expires_at: Instant::now() + ttl,
                                },
                            );
                            Ok(value)
                        }
                        Err(err) => Err(Arc::new(err)),
                    }
                }
                .boxed()
                .shared();
                inner.in_flight.insert(key.to_string(), flight.clone());
                flight
            }
        };

        flight.await
    }

    /// Drop expired entries. Cadence is a memory bound, not a correctness
    /// concern — `get_or_fetch` never returns a stale entry.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Spawn the periodic sweep task. It holds only a weak reference, so
    /// it exits once every cache handle is dropped.
    pub fn spawn_sweeper(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let now = Instant::now();
                let mut inner = inner.lock().await;
                inner.entries.retain(|_, entry| entry.expires_at > now);
            }
        })
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.lock().await.entries.remove(key);
    }

    /// Drop all cached entries. In-flight fetches are left to finish and
    /// repopulate the cache.
    pub async fn clear(&self) {
        self.inner.lock().await.entries.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            entries: inner.entries.len(),
            in_flight: inner.in_flight.len(),
        }
    }
}
