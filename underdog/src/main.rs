#![forbid(unsafe_code)]

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use underdog_lib::config::load_from_path;
use underdog_lib::telemetry::{init_metrics, init_tracing};
use underdog_lib::Shard;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sharded digest counter and rate limiter")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", default_value = "/etc/underdog.toml")]
    config: PathBuf,

    /// Override the number of shards from the configuration
    #[arg(long, env = "UNDERDOG_INSTANCES")]
    instances: Option<u16>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration from {}: {err}", cli.config.display());
            std::process::exit(1);
        }
    };
    if let Some(instances) = cli.instances {
        cfg.instances = instances;
        if let Err(err) = underdog_lib::config::validate_config(&cfg) {
            eprintln!("invalid instance override: {err}");
            std::process::exit(1);
        }
    }

    if let Err(err) = init_tracing(&cfg.logging, &cfg.telemetry) {
        eprintln!("{err}");
        std::process::exit(1);
    }
    info!(?cfg, "configuration loaded");

    let cfg = Arc::new(cfg);
    let shard = match Shard::bind(cfg.clone()).await {
        Ok(shard) => shard,
        Err(err) => {
            error!(%err, "failed to start shard");
            std::process::exit(1);
        }
    };

    let shard = if cfg.telemetry.metrics_port.is_some() {
        match init_metrics(shard.router().shard_index()) {
            Ok((metrics, registry)) => shard.with_metrics(metrics, registry),
            Err(err) => {
                error!(%err, "failed to initialize metrics");
                std::process::exit(1);
            }
        }
    } else {
        shard
    };

    if let Err(err) = shard.run().await {
        error!(%err, "shard exited with error");
        std::process::exit(1);
    }
}
