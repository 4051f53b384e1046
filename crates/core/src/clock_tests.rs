// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_advances_monotonic_and_wall() {
    let clock = FakeClock::new();
    let start = clock.now();
    let start_ms = clock.epoch_ms();
    clock.advance(Duration::from_millis(250));
    assert_eq!(clock.now() - start, Duration::from_millis(250));
    assert_eq!(clock.epoch_ms() - start_ms, 250);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_secs(1));
    assert_eq!(other.now(), clock.now());
}

#[test]
fn fake_clock_timestamp_tracks_epoch() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_700_000_123_456);
    assert_eq!(clock.timestamp().timestamp_millis(), 1_700_000_123_456);
}

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}
