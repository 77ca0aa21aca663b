//! Two-tier cache: in-process tier in front of the shared persistent tier.
//!
//! Reads check memory first, then the persistent store, promoting persistent
//! hits into memory with their remaining TTL. Writes always land in memory;
//! the persistent write is best effort. Any persistent failure or timeout is
//! logged and treated as a miss, so callers never see a persistent-tier
//! error. Whether the persistent tier is currently reachable is visible in
//! [`CacheStats`].

use std::collections::HashMap;
use std::future::Future;
use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::hash::namespace_of;
use super::memory::{MemoryTier, MemoryUsage};
use super::persistent::{PersistedEntry, PersistentStore};
use crate::Error;

/// Default bound on a single persistent-tier operation.
pub const DEFAULT_PERSISTENT_TIMEOUT: Duration = Duration::from_millis(500);

/// TTL and size policy shared by every key in a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NamespacePolicy {
    /// Default TTL in seconds; `None` keeps entries until invalidated.
    pub ttl_secs: Option<u64>,
    /// Payloads larger than this many bytes are compressed in the persistent tier.
    pub size_threshold: usize,
}

impl NamespacePolicy {
    pub const fn new(ttl_secs: u64, size_threshold: usize) -> Self {
        Self { ttl_secs: Some(ttl_secs), size_threshold }
    }

    pub const fn permanent(size_threshold: usize) -> Self {
        Self { ttl_secs: None, size_threshold }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

impl Default for NamespacePolicy {
    fn default() -> Self {
        Self::new(3600, 4096)
    }
}

/// Persistent tier health as seen by this process.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PersistentStats {
    pub enabled: bool,
    pub connected: bool,
    pub key_count: Option<u64>,
    pub errors: u64,
    pub timeouts: u64,
}

/// Aggregated cache statistics.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub persistent_hits: u64,
    pub misses: u64,
    /// Hits over lookups, as a percentage.
    pub hit_rate: f64,
    pub memory: MemoryUsage,
    pub persistent: PersistentStats,
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    persistent_errors: AtomicU64,
    persistent_timeouts: AtomicU64,
}

/// The two-tier cache service.
///
/// Constructed once and shared by `Arc`; every consumer receives it
/// explicitly.
pub struct TwoTierCache {
    memory: MemoryTier,
    persistent: Option<Arc<dyn PersistentStore>>,
    namespaces: RwLock<HashMap<String, NamespacePolicy>>,
    default_policy: NamespacePolicy,
    persistent_timeout: Duration,
    connected: AtomicBool,
    counters: Counters,
}

impl std::fmt::Debug for TwoTierCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoTierCache")
            .field("memory", &self.memory)
            .field("persistent", &self.persistent.is_some())
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl TwoTierCache {
    /// Build a cache over `memory` and an optional persistent store.
    pub fn new(memory: MemoryTier, persistent: Option<Arc<dyn PersistentStore>>) -> Self {
        let connected = AtomicBool::new(persistent.is_some());
        Self {
            memory,
            persistent,
            namespaces: RwLock::new(HashMap::new()),
            default_policy: NamespacePolicy::default(),
            persistent_timeout: DEFAULT_PERSISTENT_TIMEOUT,
            connected,
            counters: Counters::default(),
        }
    }

    /// In-process only; what a process runs with when the shared store is down.
    pub fn memory_only(max_entries: usize, max_bytes: usize) -> Self {
        Self::new(MemoryTier::new(max_entries, max_bytes), None)
    }

    pub fn with_persistent_timeout(mut self, timeout: Duration) -> Self {
        self.persistent_timeout = timeout;
        self
    }

    pub fn with_default_policy(mut self, policy: NamespacePolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Register (or replace) the policy for a namespace.
    pub async fn register_namespace(&self, name: &str, policy: NamespacePolicy) {
        tracing::debug!(namespace = name, ttl_secs = ?policy.ttl_secs, "registered cache namespace");
        self.namespaces.write().await.insert(name.to_string(), policy);
    }

    /// Policy that applies to `key`.
    pub async fn policy_for(&self, key: &str) -> NamespacePolicy {
        self.namespaces
            .read()
            .await
            .get(namespace_of(key))
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Look up a key, bounding the persistent read by the configured timeout.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.get_with_timeout(key, self.persistent_timeout).await
    }

    /// Look up a key; a persistent read slower than `timeout` counts as a miss.
    pub async fn get_with_timeout(&self, key: &str, timeout: Duration) -> Option<String> {
        if let Some(value) = self.memory.get(key).await {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key, "memory hit");
            return Some(value);
        }

        let Some(store) = &self.persistent else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let found = self.guarded("get", timeout, store.get(key)).await.flatten();
        match found.and_then(|entry| self.decode_live(key, entry)) {
            Some((value, ttl)) => {
                self.counters.persistent_hits.fetch_add(1, Ordering::Relaxed);
                self.memory.insert(key, value.clone(), ttl).await;
                tracing::trace!(key, "persistent hit, promoted to memory");
                Some(value)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Look up several keys; the result is aligned with `keys`.
    pub async fn mget(&self, keys: &[String]) -> Vec<Option<String>> {
        let mut out = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for (idx, key) in keys.iter().enumerate() {
            let value = self.memory.get(key).await;
            if value.is_some() {
                self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            } else {
                missing.push(idx);
            }
            out.push(value);
        }

        if missing.is_empty() {
            return out;
        }

        let fetched = match &self.persistent {
            Some(store) => {
                let wanted: Vec<String> = missing.iter().map(|&i| keys[i].clone()).collect();
                self.guarded("mget", self.persistent_timeout, store.get_many(&wanted))
                    .await
                    .unwrap_or_default()
            }
            None => Vec::new(),
        };

        for (pos, &idx) in missing.iter().enumerate() {
            let entry = fetched.get(pos).cloned().flatten();
            match entry.and_then(|e| self.decode_live(&keys[idx], e)) {
                Some((value, ttl)) => {
                    self.counters.persistent_hits.fetch_add(1, Ordering::Relaxed);
                    self.memory.insert(&keys[idx], value.clone(), ttl).await;
                    out[idx] = Some(value);
                }
                None => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        out
    }

    /// Store a value. `ttl == None` uses the namespace default.
    pub async fn set(&self, key: &str, value: impl Into<String>, ttl: Option<Duration>) {
        let value = value.into();
        let policy = self.policy_for(key).await;
        let ttl = ttl.or(policy.ttl());

        self.memory.insert(key, value.clone(), ttl).await;

        if let Some(store) = &self.persistent {
            let entry = encode_entry(&value, policy.size_threshold, ttl);
            self.guarded("set", self.persistent_timeout, store.put(key, entry)).await;
        }
    }

    /// Store several `(key, value, ttl)` entries.
    pub async fn mset(&self, entries: Vec<(String, String, Option<Duration>)>) {
        let mut persisted = Vec::with_capacity(entries.len());
        for (key, value, ttl) in entries {
            let policy = self.policy_for(&key).await;
            let ttl = ttl.or(policy.ttl());
            if self.persistent.is_some() {
                persisted.push((key.clone(), encode_entry(&value, policy.size_threshold, ttl)));
            }
            self.memory.insert(&key, value, ttl).await;
        }

        if let Some(store) = &self.persistent
            && !persisted.is_empty()
        {
            self.guarded("mset", self.persistent_timeout, store.put_many(persisted)).await;
        }
    }

    /// Remove a key from both tiers; returns whether either tier held it.
    pub async fn delete(&self, key: &str) -> bool {
        let in_memory = self.memory.remove(key).await;
        let in_store = match &self.persistent {
            Some(store) => self
                .guarded("delete", self.persistent_timeout, store.delete(key))
                .await
                .unwrap_or(false),
            None => false,
        };
        in_memory || in_store
    }

    /// Remove every key starting with `prefix` from both tiers.
    ///
    /// Returns the larger of the two per-tier counts.
    pub async fn delete_pattern(&self, prefix: &str) -> u64 {
        let from_memory = self.memory.remove_prefix(prefix).await;
        let from_store = match &self.persistent {
            Some(store) => self
                .guarded("delete_pattern", self.persistent_timeout, store.delete_prefix(prefix))
                .await
                .unwrap_or(0),
            None => 0,
        };
        tracing::info!(prefix, from_memory, from_store, "invalidated cache prefix");
        from_memory.max(from_store)
    }

    /// Typed read; an undecodable payload is dropped and reported as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "dropping undecodable cache entry");
                self.delete(key).await;
                None
            }
        }
    }

    /// Typed write.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<(), Error> {
        let raw = serde_json::to_string(value)?;
        self.set(key, raw, ttl).await;
        Ok(())
    }

    /// Drop expired rows from the persistent tier.
    pub async fn purge_expired(&self) -> u64 {
        match &self.persistent {
            Some(store) => self
                .guarded("purge_expired", self.persistent_timeout, store.purge_expired())
                .await
                .unwrap_or(0),
            None => 0,
        }
    }

    pub fn is_persistent_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Current statistics. Probes the persistent tier for its key count.
    pub async fn stats(&self) -> CacheStats {
        let memory_hits = self.counters.memory_hits.load(Ordering::Relaxed);
        let persistent_hits = self.counters.persistent_hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = memory_hits + persistent_hits + misses;
        let hit_rate = if lookups == 0 { 0.0 } else { (memory_hits + persistent_hits) as f64 * 100.0 / lookups as f64 };

        let key_count = match &self.persistent {
            Some(store) => self.guarded("key_count", self.persistent_timeout, store.key_count()).await,
            None => None,
        };

        CacheStats {
            memory_hits,
            persistent_hits,
            misses,
            hit_rate,
            memory: self.memory.usage().await,
            persistent: PersistentStats {
                enabled: self.persistent.is_some(),
                connected: self.is_persistent_connected(),
                key_count,
                errors: self.counters.persistent_errors.load(Ordering::Relaxed),
                timeouts: self.counters.persistent_timeouts.load(Ordering::Relaxed),
            },
        }
    }

    /// Run a persistent-tier operation, absorbing failures and timeouts.
    async fn guarded<T, F>(&self, op: &'static str, timeout: Duration, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, Error>>,
    {
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => {
                if !self.connected.swap(true, Ordering::Relaxed) {
                    tracing::info!(op, "persistent cache tier reachable again");
                }
                Some(value)
            }
            Ok(Err(e)) => {
                self.counters.persistent_errors.fetch_add(1, Ordering::Relaxed);
                if self.connected.swap(false, Ordering::Relaxed) {
                    tracing::warn!(op, error = %e, "persistent cache tier unavailable, continuing in-process only");
                } else {
                    tracing::debug!(op, error = %e, "persistent cache tier still unavailable");
                }
                None
            }
            Err(_) => {
                self.counters.persistent_timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(op, timeout_ms = timeout.as_millis() as u64, "persistent cache tier timed out");
                None
            }
        }
    }

    /// Decode a persisted row and compute the TTL left for promotion.
    fn decode_live(&self, key: &str, entry: PersistedEntry) -> Option<(String, Option<Duration>)> {
        let ttl = match entry.expires_at {
            Some(at) => Some((at - Utc::now()).to_std().ok().filter(|d| !d.is_zero())?),
            None => None,
        };
        match decode_payload(&entry.payload, entry.compressed) {
            Ok(value) => Some((value, ttl)),
            Err(e) => {
                tracing::warn!(key, error = %e, "undecodable persistent cache payload");
                None
            }
        }
    }
}

fn encode_entry(value: &str, threshold: usize, ttl: Option<Duration>) -> PersistedEntry {
    let (payload, compressed) = encode_payload(value, threshold);
    let expires_at = ttl.and_then(|t| chrono::Duration::from_std(t).ok()).map(|t| Utc::now() + t);
    PersistedEntry { payload, compressed, expires_at }
}

/// Compress payloads above `threshold`; fall back to plain bytes on failure.
fn encode_payload(value: &str, threshold: usize) -> (Vec<u8>, bool) {
    if value.len() <= threshold {
        return (value.as_bytes().to_vec(), false);
    }

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::fast());
    match encoder.write_all(value.as_bytes()).and_then(|_| encoder.finish()) {
        Ok(bytes) => (bytes, true),
        Err(e) => {
            tracing::debug!(error = %e, "compression failed, storing plain payload");
            (value.as_bytes().to_vec(), false)
        }
    }
}

fn decode_payload(payload: &[u8], compressed: bool) -> Result<String, Error> {
    if !compressed {
        return String::from_utf8(payload.to_vec()).map_err(|e| Error::Serialization(e.to_string()));
    }

    let mut out = String::new();
    DeflateDecoder::new(payload)
        .read_to_string(&mut out)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(out)
}
