use hyper::StatusCode;
use tests_e2e::common::{
    digest_for_shard, find_port_range, http_get, ring_config, send_line, Ring, TestResult,
};
use underdog_lib::config::{Config, TelemetryConfig};

#[tokio::test]
async fn serves_health_and_metrics() -> TestResult<()> {
    let base = find_port_range(2)?;
    let metrics_port = base + 1;
    let config = Config {
        telemetry: TelemetryConfig { metrics_port: Some(metrics_port), ..TelemetryConfig::default() },
        ..ring_config(base, 1, 10)
    };
    let ring = Ring::start_observed(config).await?;

    assert_eq!(send_line(ring.port(0), &digest_for_shard(1, 0)).await?, "OK:1\n");

    let (status, body) = http_get(metrics_port, "/health").await?;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["port"], base);
    assert_eq!(health["logSize"], 1);
    assert_eq!(health["freeSlots"], 63);

    let (status, _) = http_get(metrics_port, "/live").await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = http_get(metrics_port, "/metrics").await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("underdog_queries_total"), "{body}");
    assert!(body.contains("underdog_connections_total"), "{body}");
    // occupancy gauges are sampled on every scrape
    assert!(body.contains("underdog_active_records"), "{body}");

    let (status, _) = http_get(metrics_port, "/nope").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send_line(ring.port(0), "STOP").await?;
    ring.join().await
}
