//! Read-through result cache with TTL and single-flight computation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::OnceCell;
use tracing::debug;

/// Entries kept by [`MemoryCache::new`].
pub const DEFAULT_CAPACITY: usize = 1024;

/// What a cache computation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Computed<V> {
    /// Keep the value for the entry's TTL.
    Store(V),
    /// Return the value to this caller only. Callers waiting on the same key
    /// run their own computation.
    Skip(V),
}

/// Key-value cache that computes missing values on demand.
#[allow(async_fn_in_trait)]
pub trait ResultCache<V> {
    /// Return the live value for `key`, or run `factory` and return its
    /// output, storing it for `ttl` when it asks to be stored.
    async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, factory: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Computed<V>>;

    /// [`get_or_compute`](Self::get_or_compute) for values that are always stored.
    async fn get_or_set<F, Fut>(&self, key: &str, ttl: Duration, factory: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        self.get_or_compute(key, ttl, || async { Computed::Store(factory().await) })
            .await
    }
}

struct Stored<V> {
    value: V,
    expires_at: Instant,
}

struct Slot<V> {
    cell: OnceCell<Stored<V>>,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    fn expires_at(&self) -> Option<Instant> {
        self.cell.get().map(|s| s.expires_at)
    }

    /// A slot still being filled is never expired.
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }
}

/// In-process cache. Concurrent callers for the same key share one
/// computation; later callers wait for it instead of starting their own.
///
/// Holds at most `capacity` filled entries. When full, the entry closest to
/// expiry is evicted. Keys still being computed are not counted against the
/// bound, so the map can briefly exceed it by the number of in-flight keys.
pub struct MemoryCache<V> {
    slots: Mutex<HashMap<String, Arc<Slot<V>>>>,
    capacity: usize,
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl<V> MemoryCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` entries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn slot(&self, key: &str) -> Arc<Slot<V>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if let Some(slot) = slots.get(key)
            && !slot.is_expired(now)
        {
            return Arc::clone(slot);
        }

        // Drop expired entries and unfilled slots nobody is computing.
        slots.retain(|_, slot| {
            let idle = slot.expires_at().is_none() && Arc::strong_count(slot) == 1;
            !idle && !slot.is_expired(now)
        });
        while filled(&slots) >= self.capacity {
            let Some(victim) = soonest_expiring(&slots) else {
                break;
            };
            debug!(key = %victim, "cache full, evicting");
            slots.remove(&victim);
        }

        let slot = Arc::new(Slot::new());
        slots.insert(key.to_string(), Arc::clone(&slot));
        slot
    }

    /// Number of keys held, including ones still being computed.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn filled<V>(slots: &HashMap<String, Arc<Slot<V>>>) -> usize {
    slots.values().filter(|s| s.cell.initialized()).count()
}

fn soonest_expiring<V>(slots: &HashMap<String, Arc<Slot<V>>>) -> Option<String> {
    slots
        .iter()
        .filter_map(|(key, slot)| Some((slot.expires_at()?, key)))
        .min_by_key(|(expires_at, _)| *expires_at)
        .map(|(_, key)| key.clone())
}

impl<V: Clone> ResultCache<V> for MemoryCache<V> {
    async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, factory: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Computed<V>>,
    {
        let slot = self.slot(key);
        if slot.cell.initialized() {
            debug!(key, "cache hit");
        }

        let outcome = slot
            .cell
            .get_or_try_init(|| async {
                debug!(key, "cache miss, computing");
                match factory().await {
                    Computed::Store(value) => Ok(Stored {
                        value,
                        expires_at: Instant::now() + ttl,
                    }),
                    Computed::Skip(value) => Err(value),
                }
            })
            .await;
        match outcome {
            Ok(stored) => stored.value.clone(),
            Err(value) => {
                debug!(key, "result not cached");
                value
            }
        }
    }
}

/// 32-bit polynomial rolling hash (base 31). Stable across runs and
/// platforms; not collision resistant.
pub fn rolling_hash(text: &str) -> u32 {
    text.chars()
        .fold(0u32, |h, c| h.wrapping_mul(31).wrapping_add(c as u32))
}

/// Cache key for one research request.
pub fn cache_key(location: &str, limit: usize, query: &str, lang: &str) -> String {
    let digest = rolling_hash(&format!("{query}{lang}"));
    format!("research:{location}:{limit}:{digest:08x}")
}
