//! Per-transfer expiry timers
//!
//! Each prepared (escrowed) transfer gets exactly one timer that drives it
//! to `Cancelled` if it is still unfulfilled at the deadline. Firing and
//! manual cancellation are reconciled against live registry state by the
//! callback, not here: a timer that fires after the transfer already left
//! `Prepared` must be a no-op, so a late tick is harmless.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// An armed timer; the generation ties the map entry to its task so a fired
/// timer only removes itself, never a replacement armed under the same id
#[derive(Debug)]
struct TimerSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

/// One-shot cancellation timers, keyed by transfer id
#[derive(Debug, Default)]
pub struct ExpiryScheduler {
    timers: Arc<DashMap<Uuid, TimerSlot>>,
    generation: AtomicU64,
}

impl ExpiryScheduler {
    /// Create a scheduler with no armed timers
    pub fn new() -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Arm a timer that invokes `on_expire` once at `expires_at`
    ///
    /// A deadline already in the past is clamped to an immediate fire.
    /// Re-arming an id replaces (aborts) the previous timer. A fired timer
    /// removes its own entry, so the map only tracks live timers.
    pub fn arm<F, Fut>(&self, id: Uuid, expires_at: DateTime<Utc>, on_expire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let delay = (expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        debug!(%id, expires_at = %expires_at.to_rfc3339(), delay_ms = delay.as_millis() as u64, "arming expiry timer");

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_expire().await;
            timers.remove_if(&id, |_, slot| slot.generation == generation);
        });

        if let Some(previous) = self.timers.insert(id, TimerSlot { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Disarm the timer for a transfer; idempotent
    ///
    /// Called on every terminal transition so a stale timer can never tick
    /// after a fulfill or reject already completed.
    pub fn disarm(&self, id: &Uuid) {
        if let Some((_, slot)) = self.timers.remove(id) {
            slot.handle.abort();
            debug!(%id, "disarmed expiry timer");
        }
    }

    /// True while a timer for this id is armed and has not yet fired
    pub fn is_armed(&self, id: &Uuid) -> bool {
        self.timers
            .get(id)
            .map(|slot| !slot.handle.is_finished())
            .unwrap_or(false)
    }

    /// Number of timer entries currently tracked
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// True when no timer is tracked
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.value().handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_at_deadline() {
        let scheduler = ExpiryScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        let counter = Arc::clone(&fired);
        scheduler.arm(id, Utc::now() + ChronoDuration::seconds(30), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_prevents_firing() {
        let scheduler = ExpiryScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        let counter = Arc::clone(&fired);
        scheduler.arm(id, Utc::now() + ChronoDuration::seconds(30), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.is_armed(&id));

        scheduler.disarm(&id);
        assert!(!scheduler.is_armed(&id));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_deadline_fires_immediately() {
        let scheduler = ExpiryScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        let counter = Arc::clone(&fired);
        scheduler.arm(id, Utc::now() - ChronoDuration::seconds(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fired_timers_drain_from_the_map() {
        let scheduler = ExpiryScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&fired);
            scheduler.arm(
                Uuid::new_v4(),
                Utc::now() - ChronoDuration::seconds(5),
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            );
        }
        assert_eq!(scheduler.len(), 100);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 100);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_after_fire_tracks_only_the_new_timer() {
        let scheduler = ExpiryScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        let counter = Arc::clone(&fired);
        scheduler.arm(id, Utc::now() - ChronoDuration::seconds(1), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_empty());

        let counter = Arc::clone(&fired);
        scheduler.arm(id, Utc::now() + ChronoDuration::seconds(10), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.is_armed(&id));
        assert_eq!(scheduler.len(), 1);

        // Disarming after a fire is harmless either way
        scheduler.disarm(&id);
        assert!(scheduler.is_empty());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let scheduler = ExpiryScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        let first = Arc::clone(&fired);
        scheduler.arm(id, Utc::now() + ChronoDuration::seconds(10), move || async move {
            first.fetch_add(1, Ordering::SeqCst);
        });

        let second = Arc::clone(&fired);
        scheduler.arm(id, Utc::now() + ChronoDuration::seconds(20), move || async move {
            second.fetch_add(10, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }
}
