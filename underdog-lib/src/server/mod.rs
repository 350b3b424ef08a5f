//! One shard: a TCP accept loop in front of a private hash tracker.

mod forward;
mod handler;
mod listener;

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{validate_config, Config};
use crate::error::{Result, UnderdogError};
use crate::protocol::Command;
use crate::routing::ShardRouter;
use crate::stats::ServerStats;
use crate::telemetry::{start_observability_server, Metrics};
use crate::tracker::{lock, shared, ExpirySweeper, HashTracker, SharedTracker};

pub use forward::exchange;
pub use listener::bind_first_free;

/// State shared by every connection of a shard.
pub(crate) struct ShardContext {
    config: Arc<Config>,
    router: ShardRouter,
    tracker: SharedTracker,
    stats: Arc<ServerStats>,
    metrics: Option<Arc<Metrics>>,
    stopping: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl ShardContext {
    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout.connect_ms)
    }

    fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout.idle_ms)
    }

    /// Passes STOP to the next shard in the ring.
    async fn cascade_stop(&self) {
        let Some(port) = self.router.successor_port() else {
            return;
        };
        let addr = SocketAddr::new(self.config.proxy_ip(), port);
        match exchange(addr, &Command::Stop, self.connect_timeout(), self.idle_timeout()).await {
            Ok(_) => debug!(%addr, "STOP passed on"),
            Err(e) => warn!(%addr, error = %e, "failed to pass STOP on"),
        }
    }

    /// Leaves the accept loop once the grace period has passed.
    fn schedule_shutdown(&self) {
        let grace = Duration::from_millis(self.config.timeout.shutdown_grace_ms);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            shutdown.send_replace(true);
        });
    }
}

pub struct Shard {
    config: Arc<Config>,
    listener: TcpListener,
    router: ShardRouter,
    tracker: SharedTracker,
    stats: Arc<ServerStats>,
    metrics: Option<(Arc<Metrics>, Registry)>,
    shutdown: watch::Sender<bool>,
}

impl Shard {
    /// Claims the first free shard port and allocates the tracker.
    pub async fn bind(config: Arc<Config>) -> Result<Self> {
        let tracker = HashTracker::new(&config.cache)?;
        Self::bind_with_tracker(config, tracker).await
    }

    /// Like [`Shard::bind`] with a tracker built by the caller. Rejects an invalid `config`.
    pub async fn bind_with_tracker(config: Arc<Config>, tracker: HashTracker) -> Result<Self> {
        validate_config(&config)?;
        let (listener, port) =
            bind_first_free(config.listen_ip, config.base_port, config.instances).await?;
        let router = ShardRouter::new(config.base_port, config.instances, port);
        info!(
            port,
            instances = config.instances,
            records = tracker.capacity(),
            "shard ready"
        );
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config,
            listener,
            router,
            tracker: shared(tracker),
            stats: Arc::new(ServerStats::new()),
            metrics: None,
            shutdown,
        })
    }

    /// Records Prometheus metrics and, when `telemetry.metrics_port` is set, serves them.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>, registry: Registry) -> Self {
        self.metrics = Some((metrics, registry));
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn port(&self) -> u16 {
        self.router.own_port()
    }

    pub fn router(&self) -> ShardRouter {
        self.router
    }

    pub fn tracker(&self) -> SharedTracker {
        self.tracker.clone()
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    /// Sending `true` stops the shard as if it had received STOP, without the cascade.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    pub async fn run(self) -> Result<()> {
        let Shard { config, listener, router, tracker, stats, metrics, shutdown } = self;
        let (metrics, registry) = match metrics {
            Some((metrics, registry)) => (Some(metrics), Some(registry)),
            None => (None, None),
        };

        let sweeper = ExpirySweeper::new(
            tracker.clone(),
            Duration::from_secs(config.cache.tidy_up_interval_secs),
        );
        let sweeper = match &metrics {
            Some(m) => {
                let m = m.clone();
                sweeper.on_sweep(move |released| m.record_expired(released))
            }
            None => sweeper,
        };
        tokio::spawn(sweeper.run(shutdown.subscribe()));

        let on_roll = {
            let metrics = metrics.clone();
            let tracker = tracker.clone();
            move || {
                if let Some(metrics) = &metrics {
                    if let Ok(guard) = lock(&tracker) {
                        let tracker_stats = guard.stats();
                        drop(guard);
                        metrics.record_tracker(&tracker_stats);
                    }
                }
            }
        };
        tokio::spawn(stats.clone().run_smoother(
            Duration::from_secs(config.stats.update_interval_secs),
            shutdown.subscribe(),
            on_roll,
        ));

        if let (Some(registry), Some(shard_metrics), Some(base)) =
            (registry, metrics.clone(), config.telemetry.metrics_port)
        {
            let addr = SocketAddr::new(config.listen_ip, base + router.shard_index());
            let server = start_observability_server(
                addr,
                registry,
                shard_metrics,
                tracker.clone(),
                router.own_port(),
                shutdown.subscribe(),
            );
            tokio::spawn(async move {
                if let Err(e) = server.await {
                    warn!(error = %e, "observability server exited with error");
                }
            });
        }

        let ctx = Arc::new(ShardContext {
            config,
            router,
            tracker,
            stats,
            metrics,
            stopping: AtomicBool::new(false),
            shutdown: shutdown.clone(),
        });

        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(|e| {
                UnderdogError::Io(std::io::Error::other(format!(
                    "Failed to setup SIGTERM handler: {e}"
                )))
            })?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .map_err(|e| {
                UnderdogError::Io(std::io::Error::other(format!(
                    "Failed to setup SIGINT handler: {e}"
                )))
            })?;
        let mut stop = shutdown.subscribe();

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down");
                    break;
                }
                res = stop.changed() => {
                    if res.is_err() || *stop.borrow() {
                        break;
                    }
                }
                result = listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept error");
                            continue;
                        }
                    };
                    tokio::spawn(handler::handle_conn(ctx.clone(), stream, peer));
                }
            }
        }

        shutdown.send_replace(true);
        info!(port = ctx.router.own_port(), "shard stopped");
        Ok(())
    }
}

/// Binds a shard for `config` and serves until STOP or a termination signal.
pub async fn run(config: Arc<Config>) -> Result<()> {
    Shard::bind(config).await?.run().await
}
