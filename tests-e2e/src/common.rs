//! Helpers for running a ring of shards inside the test process.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use underdog_lib::config::{CacheConfig, Config, TimeoutConfig};
use underdog_lib::telemetry::init_metrics;
use underdog_lib::Shard;

pub type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// How long a test waits for any single reply or shutdown.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Finds `count` consecutive ports that are free right now.
pub fn find_port_range(count: u16) -> TestResult<u16> {
    for _ in 0..50 {
        let base = StdTcpListener::bind((LOCALHOST, 0))?.local_addr()?.port();
        if base.checked_add(count).is_none() {
            continue;
        }
        let held: Result<Vec<_>, _> =
            (base..base + count).map(|port| StdTcpListener::bind((LOCALHOST, port))).collect();
        if held.is_ok() {
            return Ok(base);
        }
    }
    Err("no range of consecutive free ports found".into())
}

pub fn ring_config(base_port: u16, instances: u16, max_count: u64) -> Config {
    Config {
        listen_ip: LOCALHOST,
        proxy_ip: Some(LOCALHOST),
        base_port,
        instances,
        cache: CacheConfig {
            num_records: 64,
            max_count,
            max_age_secs: 3600,
            time_chunk_secs: 7200,
            tidy_up_interval_secs: 60,
        },
        timeout: TimeoutConfig { connect_ms: 500, idle_ms: 1000, shutdown_grace_ms: 0 },
        ..Config::default()
    }
}

/// Shards started in port order, each one serving on its own task.
pub struct Ring {
    pub base_port: u16,
    pub instances: u16,
    handles: Vec<JoinHandle<underdog_lib::Result<()>>>,
}

impl Ring {
    /// Starts `running` shards of a ring sized by `config.instances`.
    pub async fn start(config: Config, running: u16) -> TestResult<Self> {
        let config = Arc::new(config);
        let mut handles = Vec::with_capacity(running as usize);
        for _ in 0..running {
            let shard = Shard::bind(config.clone()).await?;
            handles.push(tokio::spawn(shard.run()));
        }
        Ok(Self { base_port: config.base_port, instances: config.instances, handles })
    }

    /// Starts a single shard with Prometheus metrics and its observability server.
    /// The meter provider is process-global, so only one such shard per test binary.
    pub async fn start_observed(config: Config) -> TestResult<Self> {
        let config = Arc::new(config);
        let shard = Shard::bind(config.clone()).await?;
        let (metrics, registry) = init_metrics(shard.router().shard_index())?;
        let handle = tokio::spawn(shard.with_metrics(metrics, registry).run());
        Ok(Self { base_port: config.base_port, instances: config.instances, handles: vec![handle] })
    }

    pub fn port(&self, shard: u16) -> u16 {
        self.base_port + shard
    }

    /// Waits for every running shard to leave its accept loop.
    pub async fn join(self) -> TestResult<()> {
        for handle in self.handles {
            tokio::time::timeout(REPLY_TIMEOUT, handle).await???;
        }
        Ok(())
    }

    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// A digest whose trailing 12 bits route it to `shard`.
pub fn digest_for_shard(seed: u32, shard: u16) -> String {
    format!("{seed:029x}{shard:03x}")
}

/// Sends one command line and returns everything the shard writes back.
pub async fn send_line(port: u16, line: &str) -> TestResult<String> {
    let mut stream = TcpStream::connect(SocketAddr::new(LOCALHOST, port)).await?;
    stream.write_all(format!("{line}\n").as_bytes()).await?;
    let mut reply = String::new();
    tokio::time::timeout(REPLY_TIMEOUT, stream.read_to_string(&mut reply)).await??;
    Ok(reply)
}

/// Reads one `key=value` line out of a STATS reply.
pub fn stat(reply: &str, key: &str) -> Option<i64> {
    reply
        .lines()
        .filter_map(|line| line.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| v.parse().ok())
}

/// Issues `GET path` over HTTP/1.1, retrying the connect while the server starts up.
pub async fn http_get(port: u16, path: &str) -> TestResult<(StatusCode, String)> {
    let addr = SocketAddr::new(LOCALHOST, port);
    let mut attempts = 0;
    let stream = loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => break stream,
            Err(e) if attempts >= 50 => return Err(e.into()),
            Err(_) => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    };

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(conn);

    let req = Request::get(path)
        .header(hyper::header::HOST, addr.to_string())
        .body(Empty::<Bytes>::new())?;
    let resp = tokio::time::timeout(REPLY_TIMEOUT, sender.send_request(req)).await??;
    let status = resp.status();
    let body = resp.into_body().collect().await?.to_bytes();
    Ok((status, String::from_utf8(body.to_vec())?))
}
