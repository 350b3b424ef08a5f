use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use underdog_lib::config::{CacheConfig, Config, StatsConfig, TimeoutConfig};
use underdog_lib::tracker::{HashTracker, ManualClock};
use underdog_lib::{Shard, UnderdogError};

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const D1: &str = "0123456789abcdef0123456789abcdef";

fn pick_free_port() -> TestResult<u16> {
    let listener = StdTcpListener::bind((LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

fn single_shard_config(base_port: u16) -> Config {
    Config {
        listen_ip: LOCALHOST,
        base_port,
        instances: 1,
        cache: CacheConfig {
            num_records: 4,
            max_count: 2,
            max_age_secs: 3600,
            time_chunk_secs: 7200,
            tidy_up_interval_secs: 60,
        },
        timeout: TimeoutConfig { connect_ms: 500, idle_ms: 500, shutdown_grace_ms: 0 },
        ..Config::default()
    }
}

async fn start_shard(config: Config) -> TestResult<(SocketAddr, JoinHandle<underdog_lib::Result<()>>)> {
    let config = Arc::new(config);
    let tracker = HashTracker::with_clock(&config.cache, Arc::new(ManualClock::new(1_000_000)))?;
    let shard = Shard::bind_with_tracker(config, tracker).await?;
    let addr = shard.local_addr()?;
    Ok((addr, tokio::spawn(shard.run())))
}

async fn send(addr: SocketAddr, payload: &[u8]) -> TestResult<String> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(payload).await?;
    let mut reply = String::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_string(&mut reply)).await??;
    Ok(reply)
}

#[tokio::test]
async fn counts_then_blocks_a_digest() -> TestResult<()> {
    let (addr, handle) = start_shard(single_shard_config(pick_free_port()?)).await?;

    assert_eq!(send(addr, format!("{D1}\n").as_bytes()).await?, "OK:1\n");
    assert_eq!(send(addr, format!("{}\r\n", D1.to_uppercase()).as_bytes()).await?, "OK:2\n");
    // retry_at = 1_000_000 + max_age + tidy_up_interval
    assert_eq!(send(addr, format!("{D1}\n").as_bytes()).await?, "BLOCK:1003660\n");

    assert_eq!(send(addr, b"STOP\n").await?, "SHUTTING DOWN\n");
    tokio::time::timeout(Duration::from_secs(2), handle).await???;
    Ok(())
}

#[tokio::test]
async fn exactly_32_bytes_without_newline_is_a_command() -> TestResult<()> {
    let (addr, handle) = start_shard(single_shard_config(pick_free_port()?)).await?;

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(D1.as_bytes()).await?;
    let mut reply = String::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_string(&mut reply)).await??;
    assert_eq!(reply, "OK:1\n");

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn rejects_bad_input() -> TestResult<()> {
    let (addr, handle) = start_shard(single_shard_config(pick_free_port()?)).await?;

    assert_eq!(
        send(addr, b"hello\n").await?,
        "ERROR:Invalid input - expected command or 32 character hex string\n"
    );
    assert!(send(addr, b"0123456789abcdef0123456789abcdeg\n").await?.starts_with("ERROR:"));
    assert_eq!(
        send(addr, b"0123456789abcdef0123456789abcdef0\n").await?,
        "ERROR:Command too long\n"
    );

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn reports_stats() -> TestResult<()> {
    let (addr, handle) = start_shard(single_shard_config(pick_free_port()?)).await?;
    send(addr, format!("{D1}\n").as_bytes()).await?;
    send(addr, b"bogus\n").await?;

    let reply = send(addr, b"stats\n").await?;
    let keys: Vec<&str> = reply.lines().filter_map(|l| l.split_once('=').map(|(k, _)| k)).collect();
    assert_eq!(
        keys,
        [
            "logSize",
            "freeSlots",
            "uptime",
            "errorRate",
            "proxyRate",
            "queryRate",
            "connectionRate",
            "numClientsNow"
        ]
    );
    assert!(reply.contains("logSize=1\n"), "{reply}");
    assert!(reply.contains("freeSlots=3\n"), "{reply}");

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn silent_client_is_dropped_after_idle_timeout() -> TestResult<()> {
    let (addr, handle) = start_shard(single_shard_config(pick_free_port()?)).await?;

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"0123").await?;
    let mut reply = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(3), stream.read_to_end(&mut reply)).await?;
    assert!(read.is_ok());
    assert!(reply.is_empty());

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn second_shard_on_taken_range_fails() -> TestResult<()> {
    let base_port = pick_free_port()?;
    let (_addr, handle) = start_shard(single_shard_config(base_port)).await?;

    let config = Arc::new(single_shard_config(base_port));
    let result = Shard::bind(config).await;
    assert!(matches!(result, Err(UnderdogError::NoFreePort { instances: 1, .. })));

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn invalid_config_is_rejected_before_binding() -> TestResult<()> {
    let base_port = pick_free_port()?;
    let config = Config {
        stats: StatsConfig { update_interval_secs: 0 },
        ..single_shard_config(base_port)
    };
    let tracker = HashTracker::with_clock(&config.cache, Arc::new(ManualClock::new(1_000_000)))?;

    let result = Shard::bind_with_tracker(Arc::new(config), tracker).await;
    assert!(matches!(result, Err(UnderdogError::Config(msg)) if msg.contains("update_interval_secs")));

    // the port was never claimed
    StdTcpListener::bind((LOCALHOST, base_port))?;
    Ok(())
}

#[tokio::test]
async fn blank_lines_before_a_command_are_skipped() -> TestResult<()> {
    let (addr, handle) = start_shard(single_shard_config(pick_free_port()?)).await?;

    assert_eq!(send(addr, format!("\r\n\n{D1}\n").as_bytes()).await?, "OK:1\n");
    assert!(send(addr, b"\nSTATS\n").await?.starts_with("logSize=1\n"));

    // only terminators, then EOF: nothing to answer
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"\r\n").await?;
    stream.shutdown().await?;
    let mut reply = String::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_string(&mut reply)).await??;
    assert_eq!(reply, "");

    handle.abort();
    Ok(())
}
