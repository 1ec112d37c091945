//! Short-TTL in-memory caches for the latest per-probe and per-monitor
//! samples.
//!
//! Hand-rolled rather than pulled from a cache crate: an `Arc<RwLock<HashMap<...>>>`
//! with timestamped entries keeps this simple and dependency-free.

pub mod latest;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

pub use latest::{LatestValueCache, MonitorSnapshot, MonitorStats, ProbeSnapshot};

/// A TTL-bounded map entry. `updated_at` is stamped on every replace;
/// `is_expired` lets callers decide whether a stale-but-present read is
/// still acceptable (the monitor overview cache tolerates up to 5 minutes
/// of staleness by design).
struct Entry<V> {
    value: V,
    updated_at: i64,
}

pub struct TtlMap<K, V> {
    ttl_seconds: i64,
    inner: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlMap<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            ttl_seconds,
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.inner.read().expect("TtlMap lock poisoned");
        guard.get(key).map(|e| e.value.clone())
    }

    /// Returns the value along with whether it is past its TTL, so callers
    /// needing freshness info (e.g. the monitor-snapshot age check)
    /// can decide rather than silently treating stale as missing.
    pub fn get_with_age(&self, key: &K) -> Option<(V, bool)> {
        let guard = self.inner.read().expect("TtlMap lock poisoned");
        guard.get(key).map(|e| {
            let expired = Utc::now().timestamp() - e.updated_at > self.ttl_seconds;
            (e.value.clone(), expired)
        })
    }

    pub fn set(&self, key: K, value: V) {
        let mut guard = self.inner.write().expect("TtlMap lock poisoned");
        guard.insert(
            key,
            Entry {
                value,
                updated_at: Utc::now().timestamp(),
            },
        );
    }

    pub fn remove(&self, key: &K) {
        let mut guard = self.inner.write().expect("TtlMap lock poisoned");
        guard.remove(key);
    }

    pub fn snapshot(&self) -> Vec<(K, V)> {
        let guard = self.inner.read().expect("TtlMap lock poisoned");
        guard.iter().map(|(k, e)| (k.clone(), e.value.clone())).collect()
    }

    /// Drops entries whose TTL has lapsed. Not required for correctness
    /// (reads already check age) but keeps the map from growing unbounded
    /// for probes/monitors that get deleted without an explicit evict.
    pub fn sweep_expired(&self) {
        let now = Utc::now().timestamp();
        let mut guard = self.inner.write().expect("TtlMap lock poisoned");
        guard.retain(|_, e| now - e.updated_at <= self.ttl_seconds);
    }
}
