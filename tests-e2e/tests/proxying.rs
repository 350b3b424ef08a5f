use tests_e2e::common::{
    digest_for_shard, find_port_range, ring_config, send_line, stat, Ring, TestResult,
};

#[tokio::test]
async fn any_shard_answers_for_the_owner() -> TestResult<()> {
    let base = find_port_range(3)?;
    let ring = Ring::start(ring_config(base, 3, 2), 3).await?;
    let digest = digest_for_shard(1, 2);

    assert_eq!(send_line(ring.port(0), &digest).await?, "OK:1\n");
    assert_eq!(send_line(ring.port(1), &digest).await?, "OK:2\n");
    let blocked = send_line(ring.port(2), &digest).await?;
    assert!(blocked.starts_with("BLOCK:"), "unexpected reply: {blocked}");

    send_line(ring.port(0), "STOP").await?;
    ring.join().await
}

#[tokio::test]
async fn records_live_only_on_the_owning_shard() -> TestResult<()> {
    let base = find_port_range(3)?;
    let ring = Ring::start(ring_config(base, 3, 10), 3).await?;

    for seed in 0..4 {
        send_line(ring.port(0), &digest_for_shard(seed, 1)).await?;
    }
    send_line(ring.port(2), &digest_for_shard(9, 2)).await?;

    let owner = send_line(ring.port(1), "STATS").await?;
    assert_eq!(stat(&owner, "logSize"), Some(4), "{owner}");
    assert_eq!(stat(&owner, "freeSlots"), Some(60), "{owner}");

    let proxying = send_line(ring.port(0), "STATS").await?;
    assert_eq!(stat(&proxying, "logSize"), Some(0), "{proxying}");

    let local = send_line(ring.port(2), "STATS").await?;
    assert_eq!(stat(&local, "logSize"), Some(1), "{local}");

    send_line(ring.port(0), "STOP").await?;
    ring.join().await
}

#[tokio::test]
async fn digests_route_case_insensitively() -> TestResult<()> {
    let base = find_port_range(2)?;
    let ring = Ring::start(ring_config(base, 2, 10), 2).await?;

    // routing only looks at valid digests, so an invalid one never leaves shard 0
    let reply = send_line(ring.port(0), "not-a-digest").await?;
    assert!(reply.starts_with("ERROR:Invalid input"), "{reply}");

    let digest = digest_for_shard(3, 1).to_uppercase();
    assert_eq!(send_line(ring.port(0), &digest).await?, "OK:1\n");
    assert_eq!(send_line(ring.port(1), &digest.to_lowercase()).await?, "OK:2\n");

    send_line(ring.port(1), "STOP").await?;
    ring.join().await
}

#[tokio::test]
async fn unreachable_owner_is_reported() -> TestResult<()> {
    let base = find_port_range(2)?;
    // a ring of two where only the first shard is running
    let ring = Ring::start(ring_config(base, 2, 10), 1).await?;

    let reply = send_line(ring.port(0), &digest_for_shard(5, 1)).await?;
    assert_eq!(reply, "ERROR:Problem proxying on request\n");

    assert_eq!(send_line(ring.port(0), &digest_for_shard(5, 0)).await?, "OK:1\n");

    ring.abort();
    Ok(())
}
