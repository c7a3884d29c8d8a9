//! Re-armable delayed actions
//!
//! A `BettingWindow` keeps at most one pending timer per key. Arming a key
//! that already has a timer aborts the old one and starts the countdown
//! again. On expiry the timer removes itself from the live set before the
//! action runs, so a concurrent re-arm or cancel can never interrupt an
//! action that has already started.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

struct Timer {
    generation: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

pub struct BettingWindow<K> {
    timers: Arc<DashMap<K, Timer>>,
    generation: AtomicU64,
}

impl<K> BettingWindow<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Run `on_expire` after `delay` unless the key is re-armed or cancelled first
    pub fn arm<F>(&self, key: K, delay: Duration, on_expire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let timers = self.timers.clone();
        let task_key = key.clone();

        // The entry guard is held until the new timer is stored, so the task
        // cannot observe the map before its own generation is in place.
        let entry = self.timers.entry(key);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let fired = timers
                .remove_if(&task_key, |_, timer| timer.generation == generation)
                .is_some();
            if fired {
                trace!(key = ?task_key, generation, "Window expired");
                on_expire.await;
            }
        });
        let timer = Timer {
            generation,
            deadline: Instant::now() + delay,
            handle,
        };

        match entry {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(timer);
                previous.handle.abort();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(timer);
            }
        }
    }

    /// Drop a pending timer without firing it
    pub fn cancel(&self, key: &K) -> bool {
        match self.timers.remove(key) {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.timers.contains_key(key)
    }

    /// Time left before the key fires
    pub fn remaining(&self, key: &K) -> Option<Duration> {
        self.timers
            .get(key)
            .map(|timer| timer.deadline.saturating_duration_since(Instant::now()))
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Abort every pending timer
    pub fn shutdown(&self) {
        self.timers.retain(|_, timer| {
            timer.handle.abort();
            false
        });
    }
}

impl<K> Default for BettingWindow<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let inner = fired.clone();
        let make = move || {
            let inner = inner.clone();
            Box::pin(async move {
                inner.fetch_add(1, Ordering::SeqCst);
            }) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
        };
        (fired, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let window = BettingWindow::new();
        let (fired, make) = counter();

        window.arm("round", Duration::from_secs(5), make());
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!window.is_armed(&"round"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_restarts_countdown() {
        let window = BettingWindow::new();
        let (fired, make) = counter();

        window.arm("round", Duration::from_secs(5), make());
        tokio::time::sleep(Duration::from_secs(4)).await;
        window.arm("round", Duration::from_secs(5), make());
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(window.remaining(&"round"), Some(Duration::from_secs(1)));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let window = BettingWindow::new();
        let (fired, make) = counter();

        window.arm(1u64, Duration::from_secs(1), make());
        assert!(window.cancel(&1));
        assert!(!window.cancel(&1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let window = BettingWindow::new();
        let (fired, make) = counter();

        window.arm(1u64, Duration::from_secs(1), make());
        window.arm(2u64, Duration::from_secs(3), make());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(window.len(), 1);

        window.shutdown();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(window.is_empty());
    }
}
