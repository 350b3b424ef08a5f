use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{Result, UnderdogError};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| UnderdogError::Config(format!("Failed to read config file: {e}")))?;
    load_from_str(&txt)
}

pub fn load_from_str(txt: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(txt)
        .map_err(|e| UnderdogError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> Result<()> {
    cfg.cache.validate().map_err(UnderdogError::Config)?;

    if cfg.instances == 0 {
        return Err(UnderdogError::Config("instances must be > 0".into()));
    }
    if cfg.base_port.checked_add(cfg.instances - 1).is_none() {
        return Err(UnderdogError::Config(format!(
            "base_port {} leaves no room for {} instances",
            cfg.base_port, cfg.instances
        )));
    }
    if cfg.stats.update_interval_secs == 0 {
        return Err(UnderdogError::Config("stats.update_interval_secs must be > 0".into()));
    }
    if cfg.timeout.connect_ms == 0 {
        return Err(UnderdogError::Config("timeout.connect_ms must be > 0".into()));
    }
    if cfg.timeout.idle_ms == 0 {
        return Err(UnderdogError::Config("timeout.idle_ms must be > 0".into()));
    }
    if let Some(port) = cfg.telemetry.metrics_port {
        if port.checked_add(cfg.instances - 1).is_none() {
            return Err(UnderdogError::Config(format!(
                "telemetry.metrics_port {port} leaves no room for {} instances",
                cfg.instances
            )));
        }
    }

    Ok(())
}
