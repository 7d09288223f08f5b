//! Shadow call-stack model.
//!
//! The runtime agent reports every call, return and line change through
//! `stackTraceUpdate` notifications. Replaying them here keeps a copy of the
//! call stack that survives the runtime crashing or hanging.

use std::path::Path;

/// One call-stack entry as last reported by the runtime hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowFrame {
    /// Source file of the frame.
    pub source: String,
    /// Current line within `source`.
    pub line: i64,
    /// Function name.
    pub name: String,
}

/// Result of [`ShadowStack::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackSnapshot {
    /// Frames inside the requested window, innermost first.
    pub frames: Vec<ShadowFrame>,
    /// Number of frames with an existing source, ignoring the window.
    pub total: usize,
}

/// Append-ordered shadow stack: index 0 is the oldest call.
///
/// Length is always `max(0, pushes - pops)`. Excess pops are ignored one by
/// one and never underflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowStack {
    frames: Vec<ShadowFrame>,
}

impl ShadowStack {
    /// Empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new innermost call.
    pub fn apply_push(&mut self, source: impl Into<String>, line: i64, name: impl Into<String>) {
        self.frames.push(ShadowFrame {
            source: source.into(),
            line,
            name: name.into(),
        });
    }

    /// Move the innermost frame to `line`. No-op on an empty stack.
    pub fn apply_update_line(&mut self, line: i64) {
        if let Some(top) = self.frames.last_mut() {
            top.line = line;
        }
    }

    /// Remove up to `count` innermost frames.
    pub fn apply_pop(&mut self, count: usize) {
        let keep = self.frames.len().saturating_sub(count);
        self.frames.truncate(keep);
    }

    /// Current depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frames are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames in push order, oldest first.
    #[must_use]
    pub fn frames(&self) -> &[ShadowFrame] {
        &self.frames
    }

    /// Innermost-first window over the frames whose source passes `exists`.
    ///
    /// Frames failing the predicate are skipped before windowing, so
    /// `start_frame` indexes into the filtered sequence. `total` counts every
    /// frame that passes the predicate.
    #[must_use]
    pub fn snapshot<F>(&self, start_frame: usize, frame_count: usize, exists: F) -> StackSnapshot
    where
        F: Fn(&Path) -> bool,
    {
        let end = start_frame.saturating_add(frame_count);
        let mut snapshot = StackSnapshot::default();

        for frame in self.frames.iter().rev() {
            if !exists(Path::new(&frame.source)) {
                continue;
            }
            if snapshot.total >= start_frame && snapshot.total < end {
                snapshot.frames.push(frame.clone());
            }
            snapshot.total += 1;
        }

        snapshot
    }
}
