//! Per-shard traffic counters and the smoothed hourly rates reported by `STATS`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::debug;

use crate::protocol::StatsReport;
use crate::tracker::TrackerStats;

/// An `f64` stored as its bit pattern.
#[derive(Debug, Default)]
struct AtomicRate(AtomicU64);

impl AtomicRate {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// A counter for the current period and its smoothed per-second rate.
#[derive(Debug, Default)]
struct Smoothed {
    count: AtomicU64,
    rate: AtomicRate,
}

impl Smoothed {
    fn incr(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds the period's count into the rate: `rate = (rate + count / period) / 2`.
    fn roll(&self, period_secs: f64) {
        let count = self.count.swap(0, Ordering::Relaxed) as f64;
        self.rate.store((self.rate.load() + count / period_secs) / 2.0);
    }

    fn hourly(&self) -> f64 {
        self.rate.load() * 3600.0
    }
}

#[derive(Debug)]
pub struct ServerStats {
    started: Instant,
    connections: Smoothed,
    errors: Smoothed,
    proxied: Smoothed,
    queries: Smoothed,
    clients_now: AtomicUsize,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            connections: Smoothed::default(),
            errors: Smoothed::default(),
            proxied: Smoothed::default(),
            queries: Smoothed::default(),
            clients_now: AtomicUsize::new(0),
        }
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a new client connection. The returned guard marks it closed on drop.
    pub fn client_connected(self: &Arc<Self>) -> ClientGuard {
        self.connections.incr();
        self.clients_now.fetch_add(1, Ordering::Relaxed);
        ClientGuard(Arc::clone(self))
    }

    pub fn record_error(&self) {
        self.errors.incr();
    }

    pub fn record_proxied(&self) {
        self.proxied.incr();
    }

    pub fn record_query(&self) {
        self.queries.incr();
    }

    pub fn clients_now(&self) -> usize {
        self.clients_now.load(Ordering::Relaxed)
    }

    /// Closes the current period of `period` length.
    pub fn roll(&self, period: Duration) {
        let secs = period.as_secs_f64().max(f64::EPSILON);
        self.connections.roll(secs);
        self.errors.roll(secs);
        self.proxied.roll(secs);
        self.queries.roll(secs);
    }

    pub fn report(&self, tracker: TrackerStats) -> StatsReport {
        StatsReport {
            log_size: tracker.active,
            free_slots: tracker.free,
            uptime_secs: self.started.elapsed().as_secs_f64(),
            error_rate: self.errors.hourly(),
            proxy_rate: self.proxied.hourly(),
            query_rate: self.queries.hourly(),
            connection_rate: self.connections.hourly(),
            clients_now: self.clients_now(),
        }
    }

    /// Rolls the rates every `period` until shutdown.
    pub async fn run_smoother(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
        on_roll: impl Fn() + Send + 'static,
    ) {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("updating stats");
                    self.roll(period);
                    on_roll();
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

pub struct ClientGuard(Arc<ServerStats>);

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.0
            .clients_now
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1))
            .ok();
    }
}
