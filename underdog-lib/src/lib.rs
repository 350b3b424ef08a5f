#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod routing;
pub mod server;
pub mod stats;
pub mod telemetry;
pub mod tracker;

pub use config::{load_from_path, CacheConfig, Config};
pub use error::{Result, UnderdogError};
pub use protocol::{Command, CommandError, Response};
pub use routing::ShardRouter;
pub use server::{run, Shard};
pub use tracker::{Digest, HashTracker, Outcome, TrackerStats};
