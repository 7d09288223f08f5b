//! Unit tests for the shadow call-stack model.
//!
//! Covers:
//! - depth always equals `max(0, pushes - pops)`
//! - `update_line` on an empty stack is a no-op
//! - snapshot ordering, windowing and existence filtering

use std::path::Path;

use aseprite_dap::stack::{ShadowFrame, ShadowStack};

fn frame(source: &str, line: i64, name: &str) -> ShadowFrame {
    ShadowFrame {
        source: source.to_owned(),
        line,
        name: name.to_owned(),
    }
}

fn all_exist(_: &Path) -> bool {
    true
}

// ── Depth ─────────────────────────────────────────────────────────────────────

/// Interleaved pushes and pops, including excess pops, leave the stack at
/// `max(0, pushes - pops)` after every step.
#[test]
fn depth_tracks_pushes_minus_pops() {
    let mut stack = ShadowStack::new();
    let mut expected: i64 = 0;

    let ops: &[(&str, usize)] = &[
        ("push", 0),
        ("push", 0),
        ("pop", 1),
        ("push", 0),
        ("pop", 5),
        ("pop", 1),
        ("push", 0),
        ("push", 0),
        ("push", 0),
        ("pop", 2),
    ];

    for (op, count) in ops {
        match *op {
            "push" => {
                stack.apply_push("a.lua", 1, "f");
                expected += 1;
            }
            _ => {
                stack.apply_pop(*count);
                expected = (expected - i64::try_from(*count).unwrap()).max(0);
            }
        }
        assert_eq!(i64::try_from(stack.len()).unwrap(), expected, "after {op}({count})");
    }
}

/// Popping more frames than exist empties the stack without panicking.
#[test]
fn excess_pop_stops_at_empty() {
    let mut stack = ShadowStack::new();
    stack.apply_push("a.lua", 1, "main");
    stack.apply_pop(3);
    assert!(stack.is_empty());

    stack.apply_pop(1);
    assert!(stack.is_empty());
}

/// `pop(0)` leaves the stack unchanged.
#[test]
fn pop_zero_is_noop() {
    let mut stack = ShadowStack::new();
    stack.apply_push("a.lua", 1, "main");
    stack.apply_pop(0);
    assert_eq!(stack.len(), 1);
}

// ── update_line ──────────────────────────────────────────────────────────────

/// `update_line` on an empty stack is ignored.
#[test]
fn update_line_on_empty_stack_is_noop() {
    let mut stack = ShadowStack::new();
    stack.apply_update_line(42);
    assert!(stack.is_empty());
}

/// `update_line` moves only the innermost frame and never changes depth.
#[test]
fn update_line_moves_innermost_frame_only() {
    let mut stack = ShadowStack::new();
    stack.apply_push("a.lua", 10, "main");
    stack.apply_push("b.lua", 5, "foo");
    stack.apply_update_line(7);

    assert_eq!(stack.len(), 2);
    assert_eq!(
        stack.frames(),
        &[frame("a.lua", 10, "main"), frame("b.lua", 7, "foo")]
    );
}

// ── snapshot ─────────────────────────────────────────────────────────────────

/// Frames come back innermost first with the total of existing frames.
#[test]
fn snapshot_is_innermost_first() {
    let mut stack = ShadowStack::new();
    stack.apply_push("a.lua", 10, "main");
    stack.apply_push("b.lua", 5, "foo");

    let snapshot = stack.snapshot(0, 10, all_exist);
    assert_eq!(
        snapshot.frames,
        vec![frame("b.lua", 5, "foo"), frame("a.lua", 10, "main")]
    );
    assert_eq!(snapshot.total, 2);
}

/// After one pop only the outer frame remains.
#[test]
fn snapshot_after_pop_shows_remaining_frame() {
    let mut stack = ShadowStack::new();
    stack.apply_push("a.lua", 10, "main");
    stack.apply_push("b.lua", 5, "foo");
    stack.apply_pop(1);

    let snapshot = stack.snapshot(0, 10, all_exist);
    assert_eq!(snapshot.frames, vec![frame("a.lua", 10, "main")]);
    assert_eq!(snapshot.total, 1);
}

/// Frames whose source fails the predicate are hidden and not counted.
#[test]
fn snapshot_filters_missing_sources() {
    let mut stack = ShadowStack::new();
    stack.apply_push("a.lua", 10, "main");
    stack.apply_push("[C]", 0, "pcall");
    stack.apply_push("b.lua", 5, "foo");

    let snapshot = stack.snapshot(0, 10, |path| path != Path::new("[C]"));
    assert!(snapshot.frames.iter().all(|f| f.source != "[C]"));
    assert_eq!(snapshot.frames.len(), 2);
    assert_eq!(snapshot.total, 2);
}

/// The window selects a slice but `total` still counts every existing frame.
#[test]
fn snapshot_window_does_not_change_total() {
    let mut stack = ShadowStack::new();
    for line in 1..=5 {
        stack.apply_push("a.lua", line, format!("f{line}"));
    }

    let snapshot = stack.snapshot(1, 2, all_exist);
    assert_eq!(
        snapshot.frames,
        vec![frame("a.lua", 4, "f4"), frame("a.lua", 3, "f3")]
    );
    assert_eq!(snapshot.total, 5);
}

/// A window starting past the end yields no frames.
#[test]
fn snapshot_window_past_end_is_empty() {
    let mut stack = ShadowStack::new();
    stack.apply_push("a.lua", 1, "main");

    let snapshot = stack.snapshot(3, 10, all_exist);
    assert!(snapshot.frames.is_empty());
    assert_eq!(snapshot.total, 1);
}

/// A huge frame count does not overflow the window arithmetic.
#[test]
fn snapshot_handles_unbounded_count() {
    let mut stack = ShadowStack::new();
    stack.apply_push("a.lua", 1, "main");

    let snapshot = stack.snapshot(0, usize::MAX, all_exist);
    assert_eq!(snapshot.frames.len(), 1);
}
