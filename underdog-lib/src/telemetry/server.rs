use crate::error::{Result, UnderdogError};
use crate::telemetry::health::{not_found_response, unavailable_response, RespBody};
use crate::telemetry::{health_check_response, live_check_response, Metrics};
use crate::tracker::{lock, SharedTracker};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// Start the observability server that handles metrics and health checks
/// This server runs on a dedicated port and serves:
/// - `/metrics` - Prometheus metrics, with the tracker gauges refreshed per scrape
/// - `/health` - Health check with tracker occupancy
/// - `/live` - Liveness check endpoint
pub async fn start_observability_server(
    addr: SocketAddr,
    registry: Registry,
    metrics: Arc<Metrics>,
    tracker: SharedTracker,
    shard_port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let registry = Arc::new(registry);
    let listener = TcpListener::bind(addr).await?;

    info!(?addr, "Observability server started (metrics + health checks)");

    loop {
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "Observability server: accept error");
                        continue;
                    }
                };

                let registry = registry.clone();
                let metrics = metrics.clone();
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let registry = registry.clone();
                        let metrics = metrics.clone();
                        let tracker = tracker.clone();
                        async move {
                            let result = match req.uri().path() {
                                "/health" => match lock(&tracker) {
                                    Ok(guard) => {
                                        let stats = guard.stats();
                                        drop(guard);
                                        health_check_response(shard_port, stats)
                                    }
                                    Err(_) => unavailable_response(),
                                },
                                "/live" => live_check_response(),
                                "/metrics" => metrics_response(&registry, &metrics, &tracker),
                                _ => not_found_response(),
                            };
                            match result {
                                Ok(resp) => Ok::<_, hyper::Error>(resp),
                                Err(e) => {
                                    warn!(error = %e, "Observability server: failed to build response");
                                    let body = Full::new(Bytes::from("Internal Server Error"))
                                        .map_err(|never| match never {})
                                        .boxed();
                                    let mut resp = Response::new(body);
                                    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                                    Ok(resp)
                                }
                            }
                        }
                    });

                    let builder = ConnBuilder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "Observability server: serve_connection error");
                    }
                });
            }
        }
    }

    info!("Observability server stopped");
    Ok(())
}

/// Prometheus text exposition of the shard's registry. The occupancy gauges are
/// sampled from the tracker first; a poisoned tracker leaves them at their last value.
fn metrics_response(
    registry: &Registry,
    metrics: &Metrics,
    tracker: &SharedTracker,
) -> Result<Response<RespBody>> {
    if let Ok(guard) = lock(tracker) {
        let stats = guard.stats();
        drop(guard);
        metrics.record_tracker(&stats);
    }

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| UnderdogError::Telemetry(format!("Failed to encode metrics: {e}")))?;

    let body = Full::new(Bytes::from(buffer))
        .map_err(|never| match never {})
        .boxed();
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, encoder.format_type())
        .body(body)
        .map_err(|e| UnderdogError::Telemetry(format!("Failed to build response: {e}")))
}
