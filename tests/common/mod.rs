//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use logicstore_rs::LogicSnapshot;
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Assert that every sample of `channel` matches `expected`
pub fn assert_samples(snapshot: &LogicSnapshot, channel: u16, expected: impl Fn(u64) -> bool) {
    let written = snapshot.written_samples();
    for index in 0..written {
        let actual = snapshot.sample_at(channel, index).unwrap();
        assert_eq!(
            actual,
            expected(index),
            "Sample {} of channel {} differs (written: {})",
            index,
            channel,
            written
        );
    }
}

/// Brute-force next edge in `[from, to]`
pub fn brute_next_edge(level: impl Fn(u64) -> bool, from: u64, to: u64) -> Option<u64> {
    (from.max(1)..=to).find(|&i| level(i) != level(i - 1))
}

/// Brute-force previous edge in `[1, from]`
pub fn brute_prev_edge(level: impl Fn(u64) -> bool, from: u64) -> Option<u64> {
    (1..=from).rev().find(|&i| level(i) != level(i - 1))
}
