use tests_e2e::common::{find_port_range, ring_config, send_line, Ring, TestResult};

#[tokio::test]
async fn stop_cascades_around_the_ring() -> TestResult<()> {
    let base = find_port_range(4)?;
    let ring = Ring::start(ring_config(base, 4, 10), 4).await?;

    assert_eq!(send_line(ring.port(2), "stop").await?, "SHUTTING DOWN\n");
    ring.join().await?;

    for shard in 0..4 {
        assert!(send_line(base + shard, "STATS").await.is_err(), "shard {shard} still up");
    }
    Ok(())
}

#[tokio::test]
async fn single_shard_stops_alone() -> TestResult<()> {
    let base = find_port_range(1)?;
    let ring = Ring::start(ring_config(base, 1, 10), 1).await?;

    assert_eq!(send_line(ring.port(0), "STOP").await?, "SHUTTING DOWN\n");
    ring.join().await
}
