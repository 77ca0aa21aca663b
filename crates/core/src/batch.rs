//! Rate-limited batch execution and warming re-entry guards.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::join_all;

/// Run `f` over `items` in fixed-size batches with a pause between batches.
///
/// Every item runs; results come back in input order. Failures are the
/// caller's to count, nothing here short-circuits.
pub async fn run_batched<T, R, F, Fut>(items: Vec<T>, batch_size: usize, delay: Duration, f: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();
    let mut first = true;

    while items.peek().is_some() {
        if !first && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        first = false;

        let batch: Vec<Fut> = items.by_ref().take(batch_size).map(&f).collect();
        results.extend(join_all(batch).await);
    }

    results
}

/// Holds a warming flag for as long as it lives.
#[derive(Debug)]
pub struct WarmGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> WarmGuard<'a> {
    /// Claim the flag, or `None` when a run is already in progress.
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for WarmGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_batches_preserve_order_and_pause() {
        let start = tokio::time::Instant::now();
        let results = run_batched((0..7).collect(), 3, Duration::from_millis(200), |n| async move { n * 2 }).await;

        assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12]);
        assert_eq!(start.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_batch() {
        let seen = Arc::new(AtomicUsize::new(0));
        let results = run_batched(vec![1, 2, 3, 4], 2, Duration::ZERO, |n| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                if n % 2 == 0 { Err(n) } else { Ok(n) }
            }
        })
        .await;

        assert_eq!(seen.load(Ordering::SeqCst), 4);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 2);
    }

    #[test]
    fn test_guard_blocks_reentry_until_dropped() {
        let flag = AtomicBool::new(false);
        let guard = WarmGuard::try_acquire(&flag);
        assert!(guard.is_some());
        assert!(WarmGuard::try_acquire(&flag).is_none());
        drop(guard);
        assert!(WarmGuard::try_acquire(&flag).is_some());
    }
}
