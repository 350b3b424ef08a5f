use serde::Deserialize;

/// Timeout configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Timeout for connecting to a peer shard when proxying, in milliseconds
    /// Default: 1000
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,
    /// How long a client may take to send its command line, and how long a peer shard
    /// may take to answer a proxied request, in milliseconds
    /// Default: 5000
    #[serde(default = "default_idle_timeout")]
    pub idle_ms: u64,
    /// Grace period between acknowledging STOP and leaving the accept loop, in milliseconds
    /// Default: 1000
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_timeout(),
            idle_ms: default_idle_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    1000
}

fn default_idle_timeout() -> u64 {
    5000
}

fn default_shutdown_grace() -> u64 {
    1000
}
