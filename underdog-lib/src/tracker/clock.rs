use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock seconds since the UNIX epoch.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new(start_secs: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start_secs)))
    }

    pub fn set(&self, secs: u64) {
        self.0.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Timestamps reduced modulo a fixed window so they fit a narrow field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapClock {
    window: u64,
}

impl WrapClock {
    pub fn new(window: u64) -> Self {
        assert!(window > 0, "wrap-around window must be non-zero");
        Self { window }
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn wrap(&self, epoch_secs: u64) -> u64 {
        epoch_secs % self.window
    }

    /// Seconds elapsed from `then` to `now`, both already wrapped.
    pub fn age(&self, now: u64, then: u64) -> u64 {
        (now + self.window - then) % self.window
    }
}
