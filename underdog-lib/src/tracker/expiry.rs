//! Periodic release of records that have not been seen for `max_age` seconds.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::tracker::hash_tracker::HashTracker;
use crate::tracker::{lock, SharedTracker};

impl HashTracker {
    /// Moves expired records from the tail of the active list to the free list.
    ///
    /// The active list is recency ordered, so the scan stops at the first record that
    /// is still fresh. Returns the number of records released.
    pub fn sweep(&mut self) -> usize {
        let now = self.wrap.wrap(self.clock.now_secs());
        let mut released = 0;

        while let Some(tail) = self.active.tail() {
            let age = self.wrap.age(now, self.arena.last_seen(tail));
            if age <= self.max_age {
                break;
            }
            let slot = self.active.pop_tail(&self.arena);
            self.index.remove(&self.arena.digest(slot));
            self.free.push_head(&mut self.arena, slot);
            released += 1;
        }

        self.expired += released as u64;
        if released > 0 {
            debug!(
                released,
                active = self.active.len(),
                free = self.free.len(),
                "expired records released"
            );
        }
        released
    }
}

/// Runs [`HashTracker::sweep`] on a fixed period until shutdown.
pub struct ExpirySweeper {
    tracker: SharedTracker,
    interval: Duration,
    on_sweep: Option<Arc<dyn Fn(usize) + Send + Sync>>,
}

impl ExpirySweeper {
    pub fn new(tracker: SharedTracker, interval: Duration) -> Self {
        Self { tracker, interval, on_sweep: None }
    }

    /// Callback invoked with the number of records released by each sweep.
    pub fn on_sweep(mut self, f: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_sweep = Some(Arc::new(f));
        self
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        info!("expiry sweeper stopped");
                        return;
                    }
                    continue;
                }
            }

            let released = match lock(&self.tracker) {
                Ok(mut tracker) => tracker.sweep(),
                Err(e) => {
                    error!(error = %e, "expiry sweep skipped");
                    continue;
                }
            };
            if let Some(f) = &self.on_sweep {
                f(released);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::tracker::{Digest, ManualClock};

    fn tracker(max_age: u64, time_chunk: u64, clock: &ManualClock) -> HashTracker {
        let cfg = CacheConfig {
            num_records: 8,
            max_count: 5,
            max_age_secs: max_age,
            time_chunk_secs: time_chunk,
            tidy_up_interval_secs: 1,
        };
        match HashTracker::with_clock(&cfg, Arc::new(clock.clone())) {
            Ok(t) => t,
            Err(e) => panic!("tracker config rejected: {e}"),
        }
    }

    #[test]
    fn sweep_on_empty_tracker_is_noop() {
        let clock = ManualClock::new(0);
        let mut tracker = tracker(10, 3600, &clock);
        assert_eq!(tracker.sweep(), 0);
        assert_eq!(tracker.stats().free, 8);
    }

    #[test]
    fn sweep_stops_at_first_fresh_record() {
        let clock = ManualClock::new(1_000);
        let mut tracker = tracker(10, 3600, &clock);
        let old = Digest::from_bytes([1; 16]);
        let fresh = Digest::from_bytes([2; 16]);

        tracker.check(&old);
        clock.advance(8);
        tracker.check(&fresh);
        clock.advance(5);

        assert_eq!(tracker.sweep(), 1);
        assert!(!tracker.contains(&old));
        assert!(tracker.contains(&fresh));
        assert_eq!(tracker.stats().expired, 1);
        assert_eq!(tracker.validate_invariants(), Ok(()));
    }

    #[tokio::test]
    async fn sweeper_task_releases_expired_records_until_shutdown() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let clock = ManualClock::new(1_000);
        let mut inner = tracker(10, 3600, &clock);
        inner.check(&Digest::from_bytes([7; 16]));
        let shared = crate::tracker::shared(inner);
        clock.advance(11);

        let released = Arc::new(AtomicUsize::new(0));
        let counted = released.clone();
        let sweeper = ExpirySweeper::new(shared.clone(), Duration::from_millis(50))
            .on_sweep(move |n| {
                counted.fetch_add(n, Ordering::SeqCst);
            });
        let (stop, rx) = watch::channel(false);
        let task = tokio::spawn(sweeper.run(rx));

        let mut freed = false;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            let stats = match lock(&shared) {
                Ok(t) => t.stats(),
                Err(e) => panic!("tracker lock: {e}"),
            };
            if stats.free == 8 {
                assert_eq!(stats.active, 0);
                assert_eq!(stats.expired, 1);
                freed = true;
                break;
            }
        }
        assert!(freed, "sweeper never released the expired record");
        assert_eq!(released.load(Ordering::SeqCst), 1);

        stop.send_replace(true);
        let joined = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(matches!(joined, Ok(Ok(()))), "sweeper did not stop on shutdown");
    }
}
