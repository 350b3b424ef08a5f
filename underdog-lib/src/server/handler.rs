use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::protocol::{frame, skip_blank, Command, Framed, Response};
use crate::server::forward::exchange;
use crate::server::ShardContext;
use crate::telemetry::metrics::values;
use crate::tracker::{lock, Digest};

const PROXY_FAILED: &str = "Problem proxying on request";
const INTERNAL_ERROR: &str = "Internal error";

pub(crate) async fn handle_conn(ctx: Arc<ShardContext>, mut client: TcpStream, peer: SocketAddr) {
    let _guard = ctx.stats.client_connected();
    if let Some(metrics) = &ctx.metrics {
        metrics.record_connection();
    }

    let idle = Duration::from_millis(ctx.config.timeout.idle_ms);
    let line = match timeout(idle, read_line(&mut client)).await {
        Ok(Ok(Some(line))) => line,
        Ok(Ok(None)) => {
            debug!(%peer, "client closed before sending a command");
            return;
        }
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "client network error");
            return;
        }
        Err(_) => {
            warn!(%peer, "timed out waiting for a command");
            return;
        }
    };
    debug!(%peer, command = %String::from_utf8_lossy(&line), "command received");

    let response = match Command::parse(&line) {
        Err(e) => {
            if let Some(metrics) = &ctx.metrics {
                metrics.record_error(values::ERROR_INVALID_COMMAND);
            }
            Response::from(e)
        }
        Ok(Command::Stats) => stats_response(&ctx),
        Ok(Command::Check(digest)) => check_or_proxy(&ctx, &digest).await,
        Ok(Command::Stop) => {
            if ctx.stopping.swap(true, Ordering::SeqCst) {
                // the cascade came full circle
                debug!(%peer, "already shutting down, ignoring STOP");
                return;
            }
            info!(%peer, "STOP received, shutting down");
            write_and_close(&ctx, &mut client, &Response::ShuttingDown).await;
            ctx.cascade_stop().await;
            ctx.schedule_shutdown();
            return;
        }
    };

    write_and_close(&ctx, &mut client, &response).await;
}

/// Reads until a complete command line is buffered. Bytes left unterminated at EOF
/// are treated as the command; blank input counts as no command at all.
async fn read_line(client: &mut TcpStream) -> io::Result<Option<BytesMut>> {
    let mut buf = BytesMut::with_capacity(64);
    loop {
        if let Framed::Line(line) = frame(&buf) {
            return Ok(Some(BytesMut::from(line)));
        }
        if client.read_buf(&mut buf).await? == 0 {
            let rest = skip_blank(&buf);
            return Ok((!rest.is_empty()).then(|| BytesMut::from(rest)));
        }
    }
}

fn stats_response(ctx: &ShardContext) -> Response {
    match lock(&ctx.tracker) {
        Ok(tracker) => {
            let tracker_stats = tracker.stats();
            drop(tracker);
            Response::Stats(ctx.stats.report(tracker_stats))
        }
        Err(e) => {
            error!(error = %e, "cannot report stats");
            internal_error(ctx)
        }
    }
}

async fn check_or_proxy(ctx: &ShardContext, digest: &Digest) -> Response {
    if ctx.router.is_local(digest) {
        ctx.stats.record_query();
        let outcome = match lock(&ctx.tracker) {
            Ok(mut tracker) => tracker.check(digest),
            Err(e) => {
                error!(error = %e, %digest, "cannot check digest");
                return internal_error(ctx);
            }
        };
        if let Some(metrics) = &ctx.metrics {
            metrics.record_query(&outcome);
        }
        return Response::Outcome(outcome);
    }

    ctx.stats.record_proxied();
    if let Some(metrics) = &ctx.metrics {
        metrics.record_proxied();
    }
    let port = ctx.router.port_for(digest);
    let addr = SocketAddr::new(ctx.config.proxy_ip(), port);
    debug!(%digest, %addr, "proxying to owning shard");

    match exchange(addr, &Command::Check(*digest), ctx.connect_timeout(), ctx.idle_timeout()).await {
        Ok(reply) => Response::Relayed(String::from_utf8_lossy(&reply).into_owned()),
        Err(e) => {
            warn!(%digest, %addr, error = %e, "proxying failed");
            if let Some(metrics) = &ctx.metrics {
                metrics.record_error(values::ERROR_PROXY);
            }
            Response::error(PROXY_FAILED)
        }
    }
}

fn internal_error(ctx: &ShardContext) -> Response {
    if let Some(metrics) = &ctx.metrics {
        metrics.record_error(values::ERROR_INTERNAL);
    }
    Response::error(INTERNAL_ERROR)
}

async fn write_and_close(ctx: &ShardContext, client: &mut TcpStream, response: &Response) {
    if response.is_error() {
        ctx.stats.record_error();
    }
    if let Err(e) = client.write_all(response.to_string().as_bytes()).await {
        debug!(error = %e, "failed to write response");
    }
    let _ = client.shutdown().await;
}
