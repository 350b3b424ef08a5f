mod cache;
mod loader;
mod telemetry;
mod timeout;
pub mod types;

pub use cache::CacheConfig;
pub use loader::{load_from_path, load_from_str, validate_config};
pub use telemetry::{LoggingConfig, TelemetryConfig};
pub use timeout::TimeoutConfig;
pub use types::{Config, StatsConfig};
