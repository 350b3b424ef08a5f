use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};

use tempfile::NamedTempFile;
use underdog_lib::config::{load_from_path, load_from_str, validate_config, Config};
use underdog_lib::UnderdogError;

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[test]
fn loads_minimal_config_with_defaults() -> TestResult<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "instances = 2")?;

    let cfg = load_from_path(file.path())?;
    assert_eq!(cfg.instances, 2);
    assert_eq!(cfg.listen_ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(cfg.proxy_ip(), cfg.listen_ip);
    assert_eq!(cfg.base_port, 8000);
    assert_eq!(cfg.cache.num_records, 1024);
    assert_eq!(cfg.cache.max_count, 100);
    assert_eq!(cfg.cache.max_age_secs, 3600);
    assert_eq!(cfg.cache.time_chunk_secs, 7200);
    assert_eq!(cfg.cache.tidy_up_interval_secs, 60);
    assert_eq!(cfg.stats.update_interval_secs, 60);
    assert_eq!(cfg.logging.level, "info");
    assert!(!cfg.logging.show_target);
    assert_eq!(cfg.timeout.connect_ms, 1000);
    assert_eq!(cfg.telemetry.metrics_port, None);
    Ok(())
}

#[test]
fn loads_full_config() -> TestResult<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"
listen_ip = "0.0.0.0"
proxy_ip = "10.0.0.5"
base_port = 9100
instances = 8

[cache]
num_records = 1000000
max_count = 20
max_age_secs = 600
time_chunk_secs = 3600
tidy_up_interval_secs = 15

[stats]
update_interval_secs = 30

[logging]
level = "debug"
show_target = true

[timeout]
connect_ms = 250
idle_ms = 2000
shutdown_grace_ms = 0

[telemetry]
metrics_port = 9900
"#
    )?;

    let cfg = load_from_path(file.path())?;
    assert_eq!(cfg.listen_ip, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    assert_eq!(cfg.proxy_ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
    assert_eq!(cfg.base_port, 9100);
    assert_eq!(cfg.instances, 8);
    assert_eq!(cfg.cache.num_records, 1_000_000);
    assert_eq!(cfg.cache.max_count, 20);
    assert_eq!(cfg.cache.tidy_up_interval_secs, 15);
    assert_eq!(cfg.stats.update_interval_secs, 30);
    assert_eq!(cfg.logging.level, "debug");
    assert!(cfg.logging.show_target);
    assert_eq!(cfg.timeout.idle_ms, 2000);
    assert_eq!(cfg.timeout.shutdown_grace_ms, 0);
    assert_eq!(cfg.telemetry.metrics_port, Some(9900));
    Ok(())
}

#[test]
fn missing_file_is_a_config_error() {
    let result = load_from_path("/nonexistent/underdog.toml");
    assert!(matches!(result, Err(UnderdogError::Config(_))));
}

#[test]
fn malformed_toml_is_rejected() {
    let result = load_from_str("base_port = \"eight thousand\"");
    assert!(matches!(result, Err(UnderdogError::Config(msg)) if msg.contains("parse")));
}

#[test]
fn max_age_must_fit_in_clock_window() {
    let result = load_from_str(
        r#"
instances = 1
[cache]
max_age_secs = 7200
time_chunk_secs = 7200
"#,
    );
    assert!(matches!(result, Err(UnderdogError::Config(msg)) if msg.contains("max_age_secs")));
}

#[test]
fn sweep_period_must_fit_in_clock_window() {
    // max_age alone fits, but a record can go unswept for max_age + tidy_up_interval
    let result = load_from_str(
        r#"
instances = 1
[cache]
max_age_secs = 3500
time_chunk_secs = 3600
tidy_up_interval_secs = 100
"#,
    );
    assert!(
        matches!(result, Err(UnderdogError::Config(msg)) if msg.contains("tidy_up_interval_secs"))
    );

    let result = load_from_str(
        r#"
instances = 1
[cache]
max_age_secs = 3500
time_chunk_secs = 3600
tidy_up_interval_secs = 99
"#,
    );
    assert!(result.is_ok());
}

#[test]
fn zero_values_are_rejected() {
    for body in [
        "instances = 0",
        "instances = 1\n[cache]\nnum_records = 0",
        "instances = 1\n[cache]\nmax_count = 0",
        "instances = 1\n[cache]\ntidy_up_interval_secs = 0",
        "instances = 1\n[stats]\nupdate_interval_secs = 0",
        "instances = 1\n[timeout]\nconnect_ms = 0",
    ] {
        assert!(load_from_str(body).is_err(), "accepted: {body}");
    }
}

#[test]
fn shard_ports_must_not_overflow() {
    let cfg = Config { base_port: 65_530, instances: 10, ..Config::default() };
    assert!(validate_config(&cfg).is_err());

    let cfg = Config { base_port: 65_526, instances: 10, ..Config::default() };
    assert!(validate_config(&cfg).is_ok());
}
