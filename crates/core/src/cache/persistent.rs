//! Shared persistent tier.
//!
//! [`PersistentStore`] is the seam between the two-tier cache and its backing
//! store; [`CacheDb`] implements it over the `cache_entries` table. Entries
//! expire by TTL only. Expired rows are invisible to reads and removed by
//! [`PersistentStore::purge_expired`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::{params, params_from_iter, rusqlite};

use super::connection::CacheDb;
use super::hash::namespace_of;
use crate::Error;

/// A row as stored in the persistent tier.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEntry {
    pub payload: Vec<u8>,
    pub compressed: bool,
    /// `None` means the entry never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Operations the two-tier cache needs from the shared store.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Fetch a live (non-expired) entry.
    async fn get(&self, key: &str) -> Result<Option<PersistedEntry>, Error>;

    /// Fetch several entries; the result is aligned with `keys`.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<PersistedEntry>>, Error> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    /// Insert or replace an entry. Last write wins.
    async fn put(&self, key: &str, entry: PersistedEntry) -> Result<(), Error>;

    /// Insert or replace several entries.
    async fn put_many(&self, entries: Vec<(String, PersistedEntry)>) -> Result<(), Error> {
        for (key, entry) in entries {
            self.put(&key, entry).await?;
        }
        Ok(())
    }

    /// Delete one key; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, Error>;

    /// Delete every key starting with `prefix`; returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, Error>;

    /// Number of live keys.
    async fn key_count(&self) -> Result<u64, Error>;

    /// Remove expired rows; returns the number removed.
    async fn purge_expired(&self) -> Result<u64, Error>;
}

/// Fixed-width RFC 3339 so timestamps compare correctly as text.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Escape LIKE wildcards so a prefix matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl PersistentStore for CacheDb {
    async fn get(&self, key: &str) -> Result<Option<PersistedEntry>, Error> {
        let key = key.to_string();
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<Option<PersistedEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT payload, compressed, expires_at FROM cache_entries
                     WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                )?;

                let result = stmt.query_row(params![key, now], |row| {
                    Ok(PersistedEntry {
                        payload: row.get(0)?,
                        compressed: row.get::<_, i32>(1)? == 1,
                        expires_at: parse_timestamp(row.get(2)?),
                    })
                });

                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<PersistedEntry>>, Error> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let keys = keys.to_vec();
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<Vec<Option<PersistedEntry>>, Error> {
                let placeholders = (2..keys.len() + 2).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
                let sql = format!(
                    "SELECT key, payload, compressed, expires_at FROM cache_entries
                     WHERE (expires_at IS NULL OR expires_at > ?1) AND key IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql)?;

                let bind = std::iter::once(now).chain(keys.iter().cloned());
                let rows = stmt.query_map(params_from_iter(bind), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        PersistedEntry {
                            payload: row.get(1)?,
                            compressed: row.get::<_, i32>(2)? == 1,
                            expires_at: parse_timestamp(row.get(3)?),
                        },
                    ))
                })?;

                let mut found = std::collections::HashMap::new();
                for row in rows {
                    let (key, entry) = row?;
                    found.insert(key, entry);
                }

                Ok(keys.iter().map(|k| found.get(k).cloned()).collect())
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, key: &str, entry: PersistedEntry) -> Result<(), Error> {
        self.put_many(vec![(key.to_string(), entry)]).await
    }

    async fn put_many(&self, entries: Vec<(String, PersistedEntry)>) -> Result<(), Error> {
        let created_at = timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO cache_entries (key, namespace, payload, compressed, created_at, expires_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT(key) DO UPDATE SET
                            namespace = excluded.namespace,
                            payload = excluded.payload,
                            compressed = excluded.compressed,
                            created_at = excluded.created_at,
                            expires_at = excluded.expires_at",
                    )?;
                    for (key, entry) in &entries {
                        stmt.execute(params![
                            key,
                            namespace_of(key),
                            entry.payload,
                            entry.compressed as i32,
                            created_at,
                            entry.expires_at.map(timestamp),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let pattern = like_prefix(prefix);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE key LIKE ?1 ESCAPE '\\'", params![pattern])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn key_count(&self) -> Result<u64, Error> {
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE expires_at IS NULL OR expires_at > ?1",
                    params![now],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(payload: &str, ttl_secs: Option<i64>) -> PersistedEntry {
        PersistedEntry {
            payload: payload.as_bytes().to_vec(),
            compressed: false,
            expires_at: ttl_secs.map(|s| Utc::now() + chrono::Duration::seconds(s)),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("geo:abc", entry(r#"{"lat":1.0}"#, Some(3600))).await.unwrap();

        let got = db.get("geo:abc").await.unwrap().unwrap();
        assert_eq!(got.payload, br#"{"lat":1.0}"#.to_vec());
        assert!(!got.compressed);
        assert!(got.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get("geo:nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_invisible_and_purged() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("route:short", entry("{}", Some(1))).await.unwrap();
        db.put("route:long", entry("{}", Some(3600))).await.unwrap();
        db.put("place:forever", entry("{}", None)).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

        assert!(db.get("route:short").await.unwrap().is_none());
        assert_eq!(db.key_count().await.unwrap(), 2);
        assert_eq!(db.purge_expired().await.unwrap(), 1);
        assert!(db.get("place:forever").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upsert_last_write_wins() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("geo:k", entry("old", Some(60))).await.unwrap();
        db.put("geo:k", entry("new", Some(60))).await.unwrap();
        assert_eq!(db.get("geo:k").await.unwrap().unwrap().payload, b"new".to_vec());
    }

    #[tokio::test]
    async fn test_get_many_aligned_with_keys() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_many(vec![("geo:a".into(), entry("a", None)), ("geo:c".into(), entry("c", None))])
            .await
            .unwrap();

        let keys = vec!["geo:a".to_string(), "geo:b".to_string(), "geo:c".to_string()];
        let got = db.get_many(&keys).await.unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].as_ref().unwrap().payload, b"a".to_vec());
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().unwrap().payload, b"c".to_vec());
    }

    #[tokio::test]
    async fn test_delete_prefix_is_literal() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("route:1", entry("{}", None)).await.unwrap();
        db.put("route:2", entry("{}", None)).await.unwrap();
        db.put("route_traffic:1", entry("{}", None)).await.unwrap();
        db.put("geo:1", entry("{}", None)).await.unwrap();

        assert_eq!(db.delete_prefix("route:").await.unwrap(), 2);
        assert!(db.get("route_traffic:1").await.unwrap().is_some());
        assert!(db.get("geo:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("geo:x", entry("{}", None)).await.unwrap();
        assert!(db.delete("geo:x").await.unwrap());
        assert!(!db.delete("geo:x").await.unwrap());
    }

    #[test]
    fn test_like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("route_traffic:"), "route\\_traffic:%");
        assert_eq!(like_prefix("a%b"), "a\\%b%");
    }
}
