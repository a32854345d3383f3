#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use polykern_core::error::ErrorCode;
use polykern_engine::config::ReconnectSection;
use polykern_engine::sync::ReconnectManager;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[test]
fn doubles_up_to_the_cap() {
    let mut rm = ReconnectManager::new(secs(1), secs(5));
    let seq: Vec<Duration> = (0..5).map(|_| rm.next_delay()).collect();
    assert_eq!(seq, [secs(1), secs(2), secs(4), secs(5), secs(5)]);
    assert_eq!(rm.reconnect_count(), 5);
}

#[test]
fn reset_restarts_the_sequence() {
    let mut rm = ReconnectManager::new(secs(1), secs(5));
    for _ in 0..4 {
        rm.next_delay();
    }
    rm.reset();
    assert_eq!(rm.reconnect_count(), 0);
    assert_eq!(rm.current_delay(), secs(1));
    assert_eq!(rm.next_delay(), secs(1));
    assert_eq!(rm.next_delay(), secs(2));
}

#[test]
fn max_below_initial_caps_every_wait() {
    let mut rm = ReconnectManager::new(secs(3), secs(1));
    assert_eq!(rm.current_delay(), secs(1));
    assert_eq!(rm.next_delay(), secs(1));
    assert_eq!(rm.next_delay(), secs(1));

    rm.reset();
    assert_eq!(rm.next_delay(), secs(1));
}

#[test]
fn built_from_config() {
    let mut rm = ReconnectManager::from_config(&ReconnectSection {
        initial_delay_ms: 250,
        max_delay_ms: 1000,
    });
    assert_eq!(rm.next_delay(), Duration::from_millis(250));
    assert_eq!(rm.next_delay(), Duration::from_millis(500));
    assert_eq!(rm.next_delay(), Duration::from_millis(1000));
    assert_eq!(rm.next_delay(), Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn wait_sleeps_for_the_current_delay() {
    let mut rm = ReconnectManager::new(secs(1), secs(5));
    let cancel = CancellationToken::new();

    let started = Instant::now();
    rm.wait_with_context(&cancel).await.unwrap();
    rm.wait_with_context(&cancel).await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= secs(3) && elapsed < secs(4), "elapsed={elapsed:?}");
    assert_eq!(rm.current_delay(), secs(4));
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_returns_immediately() {
    let mut rm = ReconnectManager::new(secs(30), secs(60));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let started = Instant::now();
    let err = rm.wait_with_context(&cancel).await.expect_err("cancelled");
    assert_eq!(err.code(), ErrorCode::Cancelled);
    assert_eq!(started.elapsed(), Duration::ZERO);
    // No attempt was consumed.
    assert_eq!(rm.reconnect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_wait_aborts_it() {
    let mut rm = ReconnectManager::new(secs(30), secs(60));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(secs(2)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = rm.wait_with_context(&cancel).await.expect_err("cancelled");
    assert_eq!(err.code(), ErrorCode::Cancelled);
    assert!(started.elapsed() < secs(30));
}
