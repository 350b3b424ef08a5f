use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};

use super::cache::CacheConfig;
use super::telemetry::{LoggingConfig, TelemetryConfig};
use super::timeout::TimeoutConfig;

/// Main configuration structure
/// Every shard of a deployment reads the same file
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address shards bind to
    /// Default: 127.0.0.1
    #[serde(default = "default_listen_ip")]
    pub listen_ip: IpAddr,
    /// Address used to reach peer shards when proxying
    /// Default: same as `listen_ip`
    #[serde(default)]
    pub proxy_ip: Option<IpAddr>,
    /// Port of shard 0; shard `n` listens on `base_port + n`
    /// Default: 8000
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// Number of shards the digest space is split across
    /// Default: number of available CPU cores
    #[serde(default = "default_instances")]
    pub instances: u16,
    /// Hash tracker capacity and thresholds
    #[serde(default)]
    pub cache: CacheConfig,
    /// Rate smoothing for the STATS command
    #[serde(default)]
    pub stats: StatsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Timeout configuration
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    pub fn proxy_ip(&self) -> IpAddr {
        self.proxy_ip.unwrap_or(self.listen_ip)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_ip: default_listen_ip(),
            proxy_ip: None,
            base_port: default_base_port(),
            instances: default_instances(),
            cache: CacheConfig::default(),
            stats: StatsConfig::default(),
            logging: LoggingConfig::default(),
            timeout: TimeoutConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// STATS rate smoothing configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StatsConfig {
    /// Seconds between updates of the smoothed rates
    /// Default: 60
    #[serde(default = "default_stats_interval")]
    pub update_interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { update_interval_secs: default_stats_interval() }
    }
}

fn default_listen_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_base_port() -> u16 {
    8000
}

fn default_instances() -> u16 {
    std::thread::available_parallelism()
        .map(|n| u16::try_from(n.get()).unwrap_or(u16::MAX))
        .unwrap_or(1)
}

fn default_stats_interval() -> u64 {
    60
}
