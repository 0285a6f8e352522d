//! Shared test helpers for session integration tests

#![allow(dead_code)]

use std::thread;
use std::time::Duration;
use tinylink::{LinkConfig, Session, Transport};

/// Install a test-friendly subscriber once; filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Short timers so failure paths finish quickly.
pub fn fast_config() -> LinkConfig {
    LinkConfig::new()
        .retry_timeout(Duration::from_millis(50))
        .ack_delay(Duration::from_millis(2))
        .poll_interval(Duration::from_millis(1))
        .close_timeout(Duration::from_millis(200))
}

/// Open both ends concurrently; each handshake needs the other side pumping.
pub fn open_pair<A: Transport, B: Transport>(
    a: A,
    b: B,
    config: &LinkConfig,
) -> (Session<A>, Session<B>) {
    let (config_a, config_b) = (config.clone(), config.clone());
    thread::scope(|s| {
        let left = s.spawn(move || Session::open(a, config_a));
        let right = s.spawn(move || Session::open(b, config_b));
        (
            left.join().unwrap().expect("left session should open"),
            right.join().unwrap().expect("right session should open"),
        )
    })
}

/// Deterministic payload for message `index`.
pub fn payload(index: usize, len: usize) -> Vec<u8> {
    (0..len).map(|j| (index * 31 + j * 7) as u8).collect()
}
