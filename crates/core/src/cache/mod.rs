//! Two-tier cache with a SQLite-backed shared tier.
//!
//! - `memory`: bounded in-process LRU tier
//! - `persistent`: the `PersistentStore` seam and its SQLite implementation
//! - `tiered`: the read-through/write-through composition of both tiers
//!
//! Keys are namespaced (`"route:..."`, `"geo:..."`) and hashed; the namespace
//! decides TTL and compression policy.

pub mod connection;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod persistent;
pub mod tiered;

pub use crate::Error;

pub use connection::CacheDb;
pub use hash::{compute_cache_key, namespace_of, plain_key};
pub use memory::{MemoryTier, MemoryUsage};
pub use persistent::{PersistedEntry, PersistentStore};
pub use tiered::{CacheStats, NamespacePolicy, PersistentStats, TwoTierCache};
