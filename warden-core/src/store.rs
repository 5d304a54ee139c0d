//! TTL store — the keyed state store behind every engine component.
//!
//! Features:
//! - Per-entry TTL with expiry-on-access (an expired entry is never
//!   returned; touching it deletes it)
//! - Global capacity bound with approximate-LRU eviction on insert
//! - Lock sharding by key hash for per-key linearizability under
//!   concurrent evaluation
//! - Read-modify-write primitives (`update`, `mutate_or_insert`) that hold
//!   the shard lock across the closure
//! - List and counter helpers with oldest-first trimming
//! - Wildcard key listing, hit/miss/eviction stats, JSON export/import
//!
//! The LRU eviction scan is linear over entries. That is deliberate: target
//! populations are ≤10⁵ identities and eviction only runs when the store is
//! full. Swap in a heap if a deployment ever outgrows it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{WardenError, WardenResult};

const SHARD_COUNT: usize = 16;

/// FNV-1a over a key, used for shard selection.
fn shard_hash(key: &str) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct Entry<V> {
    value: V,
    created_at_ms: i64,
    last_access_ms: i64,
    access_count: u64,
    expires_at_ms: Option<i64>,
}

impl<V> Entry<V> {
    fn expired(&self, now: i64) -> bool {
        matches!(self.expires_at_ms, Some(exp) if exp <= now)
    }
}

/// Counters exposed by [`TtlStore::stats`]. All monotonically non-decreasing
/// except `size`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
    pub size: usize,
    pub hit_rate: f64,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ExportedEntry<V> {
    value: V,
    created_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at_ms: Option<i64>,
}

/// Sharded TTL + LRU keyed store.
pub struct TtlStore<V> {
    shards: Vec<RwLock<HashMap<String, Entry<V>>>>,
    capacity: usize,
    default_ttl_ms: Option<i64>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
}

impl<V: Clone> TtlStore<V> {
    pub fn new(capacity: usize) -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self {
            shards,
            capacity: capacity.max(1),
            default_ttl_ms: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// TTL applied to entries inserted without an explicit one.
    pub fn with_default_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.default_ttl_ms = Some(ttl_ms);
        self
    }

    fn shard(&self, key: &str) -> &RwLock<HashMap<String, Entry<V>>> {
        &self.shards[shard_hash(key) as usize % SHARD_COUNT]
    }

    fn effective_ttl(&self, ttl_ms: Option<i64>) -> Option<i64> {
        ttl_ms.or(self.default_ttl_ms)
    }

    /// Insert or replace. Evicts the least-recently-accessed entry first if
    /// the store is full and `key` is new.
    pub fn set(&self, key: &str, value: V, ttl_ms: Option<i64>) {
        let now = now_ms();
        if !self.contains(key) && self.len() >= self.capacity {
            self.evict_lru();
        }
        let expires_at_ms = self.effective_ttl(ttl_ms).map(|ttl| now + ttl);
        self.shard(key).write().insert(
            key.to_string(),
            Entry {
                value,
                created_at_ms: now,
                last_access_ms: now,
                access_count: 0,
                expires_at_ms,
            },
        );
    }

    /// Get a clone of the value, refreshing recency and the access count.
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = now_ms();
        let mut shard = self.shard(key).write();
        match shard.get_mut(key) {
            Some(entry) if entry.expired(now) => {
                shard.remove(key);
                self.expired.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                entry.last_access_ms = now;
                entry.access_count += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Liveness check. Removes the entry if it has expired; does not count
    /// toward hit/miss and does not refresh recency.
    pub fn contains(&self, key: &str) -> bool {
        let now = now_ms();
        let mut shard = self.shard(key).write();
        match shard.get(key) {
            Some(entry) if entry.expired(now) => {
                shard.remove(key);
                self.expired.fetch_add(1, Ordering::Relaxed);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.shard(key).write().remove(key).is_some()
    }

    /// Apply `f` to the live value under the shard lock. Returns false when
    /// the key is absent or expired; the value is untouched in that case.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut V)) -> bool {
        let now = now_ms();
        let mut shard = self.shard(key).write();
        match shard.get_mut(key) {
            Some(entry) if entry.expired(now) => {
                shard.remove(key);
                self.expired.fetch_add(1, Ordering::Relaxed);
                false
            }
            Some(entry) => {
                entry.last_access_ms = now;
                f(&mut entry.value);
                true
            }
            None => false,
        }
    }

    /// Read-modify-write that creates the entry when missing. The whole
    /// operation holds the shard lock, so concurrent callers on the same key
    /// serialize.
    pub fn mutate_or_insert<R>(
        &self,
        key: &str,
        default: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
        ttl_ms: Option<i64>,
    ) -> R {
        let now = now_ms();
        // capacity check before taking the target shard lock
        if !self.contains(key) && self.len() >= self.capacity {
            self.evict_lru();
        }
        let expires_at_ms = self.effective_ttl(ttl_ms).map(|ttl| now + ttl);
        let mut shard = self.shard(key).write();
        let stale = matches!(shard.get(key), Some(e) if e.expired(now));
        if stale {
            shard.remove(key);
            self.expired.fetch_add(1, Ordering::Relaxed);
        }
        let entry = shard.entry(key.to_string()).or_insert_with(|| Entry {
            value: default(),
            created_at_ms: now,
            last_access_ms: now,
            access_count: 0,
            expires_at_ms,
        });
        entry.last_access_ms = now;
        entry.access_count += 1;
        // expiry is idleness-based for read-modify-write entries
        if expires_at_ms.is_some() {
            entry.expires_at_ms = expires_at_ms;
        }
        f(&mut entry.value)
    }

    /// List keys, optionally filtered by a `*` wildcard pattern.
    pub fn keys(&self, pattern: Option<&str>) -> Vec<String> {
        let now = now_ms();
        let mut out = Vec::new();
        for shard in &self.shards {
            let guard = shard.read();
            for (key, entry) in guard.iter() {
                if entry.expired(now) {
                    continue;
                }
                match pattern {
                    Some(p) if !wildcard_match(p, key) => {}
                    _ => out.push(key.clone()),
                }
            }
        }
        out.sort();
        out
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
    }

    /// Sweep expired entries. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = now_ms();
        let mut removed = 0;
        for shard in &self.shards {
            let mut guard = shard.write();
            let before = guard.len();
            guard.retain(|_, entry| !entry.expired(now));
            removed += before - guard.len();
        }
        self.expired.fetch_add(removed as u64, Ordering::Relaxed);
        if removed > 0 {
            debug!(removed, "swept expired store entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> StoreStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        StoreStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            size: self.len(),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    /// Remove the entry with the minimum `last_access` across all shards.
    /// Approximate under contention: another thread may touch the chosen
    /// entry between scan and removal.
    fn evict_lru(&self) {
        let mut oldest: Option<(String, i64)> = None;
        for shard in &self.shards {
            let guard = shard.read();
            for (key, entry) in guard.iter() {
                match &oldest {
                    Some((_, ts)) if entry.last_access_ms >= *ts => {}
                    _ => oldest = Some((key.clone(), entry.last_access_ms)),
                }
            }
        }
        if let Some((key, _)) = oldest {
            if self.delete(&key) {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "evicted least-recently-accessed entry");
            }
        }
    }
}

impl<V: Clone + Serialize> TtlStore<V> {
    /// Snapshot live entries as a JSON object keyed by cache key.
    pub fn export(&self) -> WardenResult<serde_json::Value> {
        let now = now_ms();
        let mut map = serde_json::Map::new();
        for shard in &self.shards {
            let guard = shard.read();
            for (key, entry) in guard.iter() {
                if entry.expired(now) {
                    continue;
                }
                let exported = ExportedEntry {
                    value: entry.value.clone(),
                    created_at_ms: entry.created_at_ms,
                    expires_at_ms: entry.expires_at_ms,
                };
                map.insert(
                    key.clone(),
                    serde_json::to_value(exported)
                        .map_err(|e| WardenError::Export(e.to_string()))?,
                );
            }
        }
        Ok(serde_json::Value::Object(map))
    }
}

impl<V: Clone + DeserializeOwned> TtlStore<V> {
    /// Re-hydrate entries from a prior [`TtlStore::export`]. Entries whose
    /// TTL has already passed are skipped. Returns how many were restored.
    pub fn import(&self, snapshot: &serde_json::Value) -> WardenResult<usize> {
        let now = now_ms();
        let map = snapshot
            .as_object()
            .ok_or_else(|| WardenError::Import("snapshot is not an object".into()))?;
        let mut restored = 0;
        for (key, raw) in map {
            let exported: ExportedEntry<V> = serde_json::from_value(raw.clone())
                .map_err(|e| WardenError::Import(format!("entry '{}': {}", key, e)))?;
            if matches!(exported.expires_at_ms, Some(exp) if exp <= now) {
                continue;
            }
            if self.len() >= self.capacity {
                self.evict_lru();
            }
            self.shard(key).write().insert(
                key.clone(),
                Entry {
                    value: exported.value,
                    created_at_ms: exported.created_at_ms,
                    last_access_ms: now,
                    access_count: 0,
                    expires_at_ms: exported.expires_at_ms,
                },
            );
            restored += 1;
        }
        Ok(restored)
    }
}

impl<T: Clone> TtlStore<Vec<T>> {
    /// Append to a list entry, creating it when missing and trimming
    /// oldest-first past `max_len`. Returns the list length after the push.
    pub fn push(&self, key: &str, item: T, max_len: usize, ttl_ms: Option<i64>) -> usize {
        self.mutate_or_insert(
            key,
            Vec::new,
            |list| {
                list.push(item);
                if list.len() > max_len {
                    let excess = list.len() - max_len;
                    list.drain(..excess);
                }
                list.len()
            },
            ttl_ms,
        )
    }
}

impl TtlStore<i64> {
    /// Add `amount` to a counter entry, creating it at zero when missing.
    /// Returns the new value.
    pub fn increment(&self, key: &str, amount: i64, ttl_ms: Option<i64>) -> i64 {
        self.mutate_or_insert(
            key,
            || 0,
            |counter| {
                *counter += amount;
                *counter
            },
            ttl_ms,
        )
    }
}

/// `*`-wildcard match. `*` spans any run of characters including none.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }
    let segments: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0usize;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            if !text.starts_with(segment) {
                return false;
            }
            pos = segment.len();
        } else if i == segments.len() - 1 && !pattern.ends_with('*') {
            return text.len() >= pos && text[pos..].ends_with(segment);
        } else {
            match text[pos..].find(segment) {
                Some(found) => pos += found + segment.len(),
                None => return false,
            }
        }
    }
    true
}
