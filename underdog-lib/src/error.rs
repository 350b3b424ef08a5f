use thiserror::Error;

/// Errors that can occur in a shard
#[derive(Error, Debug)]
pub enum UnderdogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No free port in {base_port}..{base_port}+{instances}: every shard is already listening")]
    NoFreePort { base_port: u16, instances: u16 },

    #[error("Proxy error: {0}")]
    Proxy(String),

    #[error("Hash tracker unavailable: a previous operation panicked")]
    TrackerPoisoned,

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

pub type Result<T> = std::result::Result<T, UnderdogError>;
