//! Namespaced, hashed cache key generation.
//!
//! Keys are `"{namespace}:{sha256-hex}"`. Hashing bounds key length no matter
//! how many waypoints or address fields went into it.

use sha2::{Digest, Sha256};

/// Hash the given parts into a namespaced key.
///
/// Parts are newline separated before hashing, so `["ab", "c"]` and
/// `["a", "bc"]` produce different keys.
pub fn compute_cache_key(namespace: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(part.as_bytes());
    }
    format!("{namespace}:{}", hex::encode(hasher.finalize()))
}

/// Build a readable key without hashing, for short natural identifiers.
pub fn plain_key(namespace: &str, id: &str) -> String {
    format!("{namespace}:{id}")
}

/// Namespace portion of a key (text before the first `:`).
pub fn namespace_of(key: &str) -> &str {
    key.split_once(':').map(|(ns, _)| ns).unwrap_or(key)
}
