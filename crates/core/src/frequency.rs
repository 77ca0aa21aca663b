//! Bounded most-used lists that prioritise warming.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::Mutex;

/// One tracked item and how often it was used.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FrequencyRecord<T> {
    pub id: String,
    pub item: T,
    pub count: u64,
    pub last_used: DateTime<Utc>,
}

/// Top-N list ordered by use count, highest first.
///
/// Each record is an increment-or-insert followed by a re-sort and a
/// truncate to the cap, so a full list only admits new items once they
/// outrank the tail.
#[derive(Debug)]
pub struct FrequencyTracker<T> {
    records: Mutex<Vec<FrequencyRecord<T>>>,
    cap: usize,
}

impl<T: Clone> FrequencyTracker<T> {
    pub fn new(cap: usize) -> Self {
        Self { records: Mutex::new(Vec::new()), cap }
    }

    /// Count one use of `item`, identified by `id`.
    pub async fn record(&self, id: &str, item: T) {
        let mut records = self.records.lock().await;
        let now = Utc::now();

        match records.iter_mut().find(|r| r.id == id) {
            Some(existing) => {
                existing.count += 1;
                existing.last_used = now;
                existing.item = item;
            }
            None => records.push(FrequencyRecord { id: id.to_string(), item, count: 1, last_used: now }),
        }

        records.sort_by(|a, b| b.count.cmp(&a.count));
        records.truncate(self.cap);
    }

    /// Up to `n` most used items, most used first.
    pub async fn top(&self, n: usize) -> Vec<T> {
        self.records.lock().await.iter().take(n).map(|r| r.item.clone()).collect()
    }

    pub async fn count_of(&self, id: &str) -> Option<u64> {
        self.records.lock().await.iter().find(|r| r.id == id).map(|r| r.count)
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_and_order() {
        let tracker = FrequencyTracker::new(10);
        tracker.record("a", "A").await;
        tracker.record("b", "B").await;
        tracker.record("b", "B").await;

        assert_eq!(tracker.top(10).await, vec!["B", "A"]);
        assert_eq!(tracker.count_of("b").await, Some(2));
        assert_eq!(tracker.len().await, 2);
    }

    #[tokio::test]
    async fn test_truncates_to_cap() {
        let tracker = FrequencyTracker::new(2);
        tracker.record("a", 1).await;
        tracker.record("a", 1).await;
        tracker.record("b", 2).await;
        tracker.record("b", 2).await;
        tracker.record("c", 3).await;

        assert_eq!(tracker.len().await, 2);
        assert_eq!(tracker.count_of("c").await, None);
        assert_eq!(tracker.top(1).await.len(), 1);
    }
}
