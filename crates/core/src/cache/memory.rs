//! In-process cache tier with LRU eviction.
//!
//! Bounded by entry count and by total key+value bytes. TTL and eviction are
//! independent: an entry can be evicted under pressure before its TTL is up,
//! and an expired entry is dropped on the next read even if nothing pushed
//! it out.

use std::collections::HashMap;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A cached value plus its bookkeeping.
#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
    created_at: Instant,
    last_used_at: Instant,
}

impl MemoryEntry {
    fn size(key: &str, value: &str) -> usize {
        key.len() + value.len()
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, MemoryEntry>,
    total_bytes: usize,
    evictions: u64,
}

impl MemoryState {
    fn remove(&mut self, key: &str) -> Option<MemoryEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= MemoryEntry::size(key, &entry.value);
        Some(entry)
    }

    fn sweep_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.remove(&key);
        }
    }

    fn evict_lru(&mut self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used_at)
            .map(|(k, _)| k.clone());
        match oldest {
            Some(key) => {
                self.remove(&key);
                self.evictions += 1;
                true
            }
            None => false,
        }
    }
}

/// Point-in-time usage of the in-process tier.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MemoryUsage {
    pub entries: usize,
    pub bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub evictions: u64,
    /// Age of the oldest resident entry in seconds.
    pub oldest_entry_age_secs: u64,
}

/// The fast, process-local tier.
#[derive(Debug)]
pub struct MemoryTier {
    state: Mutex<MemoryState>,
    max_entries: usize,
    max_bytes: usize,
}

impl MemoryTier {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self { state: Mutex::new(MemoryState::default()), max_entries, max_bytes }
    }

    /// Look up a live value, refreshing its recency.
    pub async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        if state.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            state.remove(key);
            return None;
        }

        let entry = state.entries.get_mut(key)?;
        entry.last_used_at = now;
        Some(entry.value.clone())
    }

    /// Store a value. `ttl == None` keeps it until evicted or deleted.
    ///
    /// Returns false when the value alone is larger than the byte budget; any
    /// older value under the key is dropped either way.
    pub async fn insert(&self, key: &str, value: String, ttl: Option<Duration>) -> bool {
        let size = MemoryEntry::size(key, &value);
        if size > self.max_bytes || self.max_entries == 0 {
            tracing::debug!(key, size, "value exceeds in-process budget, not cached in memory");
            self.state.lock().await.remove(key);
            return false;
        }

        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.remove(key);

        if state.entries.len() >= self.max_entries || state.total_bytes + size > self.max_bytes {
            state.sweep_expired(now);
        }
        while state.entries.len() >= self.max_entries || state.total_bytes + size > self.max_bytes {
            if !state.evict_lru() {
                break;
            }
        }

        state.total_bytes += size;
        state.entries.insert(
            key.to_string(),
            MemoryEntry { value, expires_at: ttl.map(|t| now + t), created_at: now, last_used_at: now },
        );
        true
    }

    /// Remove one key; returns whether it was present.
    pub async fn remove(&self, key: &str) -> bool {
        self.state.lock().await.remove(key).is_some()
    }

    /// Remove every key starting with `prefix`.
    pub async fn remove_prefix(&self, prefix: &str) -> u64 {
        let mut state = self.state.lock().await;
        let keys: Vec<String> = state.entries.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        for key in &keys {
            state.remove(key);
        }
        keys.len() as u64
    }

    pub async fn usage(&self) -> MemoryUsage {
        let state = self.state.lock().await;
        let now = Instant::now();
        let oldest = state.entries.values().map(|e| now.saturating_duration_since(e.created_at)).max();
        MemoryUsage {
            entries: state.entries.len(),
            bytes: state.total_bytes,
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            evictions: state.evictions,
            oldest_entry_age_secs: oldest.unwrap_or_default().as_secs(),
        }
    }
}
