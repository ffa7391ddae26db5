use std::time::{Duration, Instant};

use reel::{Cmd, Output, ReelConfig, ReelError, Scope, Spool, Streamer, Transport, rendezvous};

fn cat() -> Spool {
    Spool::new(Cmd::new("cat"))
}

fn sh(script: &str) -> Spool {
    Spool::new(Cmd::new("sh").args(["-c", script]))
}

#[tokio::test]
async fn read_round_trips_through_cat() {
    let out = Transport::new([cat()]).read(Some("hello\nworld\n")).await.unwrap();
    assert_eq!(out, "hello\nworld");

    let out = cat().run(Some("no newline")).await.unwrap();
    assert_eq!(out, "no newline");
}

#[tokio::test]
async fn long_chains_preserve_bytes() {
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let chain = Transport::new((0..8).map(|_| cat()));
    let out = chain.read_bytes(Some(payload.clone())).await.unwrap();
    assert_eq!(out.len(), payload.len());
    assert_eq!(out, payload);
}

#[tokio::test]
async fn byte_limit_is_soft() {
    let limit = 100_000u64;
    let source = Spool::new(Cmd::new("cat").arg("/dev/zero")).limit(limit);
    let chunk = source.chunk_bytes() as u64;
    let out = (source.clone() | cat()).read_bytes(None).await.unwrap();
    let got = out.len() as u64;
    assert!(got >= limit, "forwarded {got} bytes, limit {limit}");
    assert!(got < limit + chunk, "forwarded {got} bytes, overshoot too large");
    assert_eq!(source.releases(), 1);
}

#[tokio::test]
async fn limited_stage_mid_chain_drains_its_upstream() {
    let source = Spool::new(Cmd::new("cat").arg("/dev/zero"));
    let limited = cat().limit(10);
    let out = tokio::time::timeout(
        Duration::from_secs(10),
        (source.clone() | limited.clone()).read_bytes(None),
    )
    .await
    .expect("quota stop must not stall the chain")
    .unwrap();
    assert_eq!(out.len(), 10);
    assert_eq!(source.releases(), 1);
    assert_eq!(limited.releases(), 1);
}

#[tokio::test]
async fn limited_stage_with_pending_input_finishes() {
    let limited = cat().limit(10);
    let out = tokio::time::timeout(
        Duration::from_secs(10),
        Transport::new([limited.clone()]).read_bytes(Some(vec![0u8; 1 << 20])),
    )
    .await
    .expect("quota stop must not stall the input writer")
    .unwrap();
    assert_eq!(out.len(), 10);
    assert_eq!(limited.releases(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn non_utf8_paths_reach_the_process() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(OsStr::from_bytes(b"caf\xe9.raw"));
    std::fs::write(&path, b"latin-1 name").unwrap();
    let spool = Spool::new(Cmd::new("cat").arg(&path));
    let out = Transport::new([spool.clone()]).read_bytes(None).await.unwrap();
    assert_eq!(out, b"latin-1 name");
    assert_eq!(spool.stderr(), None);
}

#[tokio::test]
async fn source_ending_first_beats_the_limit() {
    let source = sh("printf abc").limit(1_000_000);
    let out = Transport::new([source]).read(None).await.unwrap();
    assert_eq!(out, "abc");
}

#[tokio::test]
async fn timeout_stops_an_endless_source() {
    let source = Spool::new(Cmd::new("cat").arg("/dev/zero")).timeout(Duration::from_millis(200));
    let started = Instant::now();
    Transport::new([source]).play().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn stderr_is_captured_per_stage() {
    let ls = Spool::new(Cmd::new("ls").arg("/not_here_at_all"));
    let out = Transport::new([ls.clone()]).read(None).await.unwrap();
    assert_eq!(out, "");
    let stderr = ls.stderr().unwrap_or_default();
    assert!(stderr.contains("not_here_at_all"), "stderr was {stderr:?}");
    assert_ne!(ls.returncode(), Some(0));
}

#[tokio::test]
async fn spawn_failure_is_fatal() {
    let err = Transport::new([Spool::new(Cmd::new("surely-not-installed-42"))])
        .play()
        .await
        .unwrap_err();
    assert!(matches!(err, ReelError::Spawn { .. }));
}

#[tokio::test]
async fn every_stage_is_released_once_on_completion() {
    let stages: Vec<Spool> = (0..4).map(|_| cat()).collect();
    let out = Transport::new(stages.clone()).read(Some("x")).await.unwrap();
    assert_eq!(out, "x");
    for stage in &stages {
        assert_eq!(stage.releases(), 1);
        assert_eq!(stage.returncode(), Some(0));
    }
}

#[tokio::test]
async fn every_stage_is_released_once_on_cancel() {
    let scope = Scope::new();
    let stages = vec![
        Spool::new(Cmd::new("cat").arg("/dev/zero")),
        cat(),
        Spool::new(Cmd::new("sleep").arg("30")).with_config(ReelConfig {
            close_grace: Duration::from_millis(100),
            ..ReelConfig::default()
        }),
    ];
    let chain = Transport::new(stages.clone());
    let canceller = scope.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });
    tokio::time::timeout(Duration::from_secs(10), chain.run_in(&scope, None, Output::Discard))
        .await
        .unwrap()
        .unwrap();
    for stage in &stages {
        assert_eq!(stage.releases(), 1);
        assert!(!stage.is_running().await);
    }
}

#[tokio::test]
async fn closed_downstream_stops_the_upstream() {
    let source = Spool::new(Cmd::new("cat").arg("/dev/zero"));
    let head = Spool::new(Cmd::new("head").args(["-c", "10"]));
    let out = tokio::time::timeout(Duration::from_secs(10), (source.clone() | head).read_bytes(None))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out.len(), 10);
    assert_eq!(source.releases(), 1);
}

#[tokio::test]
async fn output_consumer_sees_backpressure() {
    let (tx, mut rx) = rendezvous();
    let source = Spool::new(Cmd::new("cat").arg("/dev/zero"));
    let chain = source.clone() | cat();
    let runner = tokio::spawn(async move { chain.run(None, Output::Channel(tx)).await });

    let first = rx.recv().await.unwrap();
    assert!(!first.is_empty());
    tokio::time::sleep(Duration::from_millis(100)).await;
    // A stalled consumer bounds what the source can push through the pipes.
    assert!(source.bytes_out() < 4 * 1024 * 1024);
    drop(rx);

    tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(source.releases(), 1);
}
