//! Lifecycle tests: start/stop ordering, bind failures, and shutdown with
//! connections still open.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::Receiver;
use tokio::time::{sleep, timeout};

use svarog::channel::MemoryChannel;
use svarog::common::SourceError;
use svarog::config::Config;
use svarog::event::Event;
use svarog::lifecycle::LifecycleState;
use svarog::net::LineSource;

fn loopback_config() -> Config {
    let mut cfg = Config::default();
    cfg.listen.host = "127.0.0.1".into();
    cfg.listen.port = 0;
    cfg
}

/// The receiver comes back alongside the source; dropping it closes the
/// channel and every put is refused from then on.
fn new_source(cfg: Config) -> (Arc<LineSource>, Receiver<Event>) {
    let (channel, rx) = MemoryChannel::new(100);
    (Arc::new(LineSource::new(cfg, Arc::new(channel))), rx)
}

/// Wait until a counter reaches at least `want`, or panic.
async fn wait_for_counter(source: &LineSource, name: &str, want: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while source.counters().get(name) < want {
        if tokio::time::Instant::now() > deadline {
            panic!("counter {} never reached {}", name, want);
        }
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_stop_releases_the_port() {
    let (source, _rx) = new_source(loopback_config());
    source.start().await.unwrap();
    let addr = source.local_addr().unwrap();

    // one clean session first
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"x\n").await.unwrap();
    client.shutdown().await.unwrap();
    let mut replies = Vec::new();
    client.read_to_end(&mut replies).await.unwrap();
    assert_eq!(replies, b"OK\n");
    drop(client);

    source.stop().await.unwrap();
    assert_eq!(source.state(), LifecycleState::Stopped);
    assert_eq!(source.counters().get("sessions.completed"), 1);
    assert_eq!(source.counters().get("sessions.broken"), 0);

    // the listener is gone; a fresh connection must not succeed
    let res = timeout(Duration::from_secs(1), TcpStream::connect(addr)).await;
    match res {
        Ok(Ok(_)) => panic!("connected to a stopped source"),
        Ok(Err(_)) | Err(_) => {}
    }
}

#[tokio::test]
async fn test_stop_is_idempotent_and_start_is_not() {
    let (source, _rx) = new_source(loopback_config());
    source.start().await.unwrap();

    // second start while running
    let err = source.start().await.unwrap_err();
    assert!(matches!(err, SourceError::InvalidState { .. }));
    assert!(err.to_string().contains("started"));

    source.stop().await.unwrap();
    source.stop().await.unwrap();
    assert_eq!(source.state(), LifecycleState::Stopped);

    // a stopped source cannot be restarted
    let err = source.start().await.unwrap_err();
    assert!(matches!(err, SourceError::InvalidState { .. }));
    assert!(err.to_string().contains("stopped"));
}

#[tokio::test]
async fn test_stop_without_start_just_marks_stopped() {
    let (source, _rx) = new_source(loopback_config());
    source.stop().await.unwrap();
    assert_eq!(source.state(), LifecycleState::Stopped);
    assert_eq!(source.counters().get("open.attempts"), 0);
}

#[tokio::test]
async fn test_bind_conflict_is_reported_and_state_stays_new() {
    let (first, _rx_first) = new_source(loopback_config());
    first.start().await.unwrap();
    let addr = first.local_addr().unwrap();

    let mut cfg = loopback_config();
    cfg.listen.port = addr.port();
    let (second, _rx_second) = new_source(cfg);

    let err = second.start().await.unwrap_err();
    assert!(matches!(err, SourceError::Bind { .. }));
    assert!(err.to_string().contains("unable to bind"));
    assert_eq!(second.state(), LifecycleState::New);
    assert_eq!(second.counters().get("open.attempts"), 1);
    assert_eq!(second.counters().get("open.errors"), 1);

    first.stop().await.unwrap();
}

#[tokio::test]
async fn test_idle_sessions_are_aborted_and_counted_broken() {
    let (source, _rx) = new_source(loopback_config());
    source.start().await.unwrap();
    let addr = source.local_addr().unwrap();

    // connect and send nothing; the worker sits in its read
    let client = TcpStream::connect(addr).await.unwrap();
    wait_for_counter(&source, "accept.succeeded", 1).await;

    // abort path is not a shutdown error
    source.stop().await.unwrap();

    assert_eq!(source.counters().get("sessions.broken"), 1);
    assert_eq!(source.counters().get("sessions.completed"), 0);
    drop(client);
}
