//! Unit tests for the one-shot teardown latch.

use aseprite_dap::session::TeardownLatch;

/// Only the first acquire wins, across clones.
#[test]
fn first_acquire_wins() {
    let latch = TeardownLatch::new();
    let other = latch.clone();

    assert!(!latch.is_tripped());
    assert!(other.try_acquire());
    assert!(!latch.try_acquire());
    assert!(!other.try_acquire());
    assert!(latch.is_tripped());
}

/// Concurrent acquirers see exactly one winner.
#[test]
fn concurrent_acquire_has_one_winner() {
    let latch = TeardownLatch::new();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let latch = latch.clone();
            std::thread::spawn(move || latch.try_acquire())
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().expect("join"))
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}
