//! Security frame stack
//!
//! One stack per call chain. Each active invocation owns one frame holding
//! the relation in force while its body runs. Pass-through members do not
//! introduce a new level: their frame repeats the enclosing relation.
//!
//! Frames are popped by [`FrameGuard`](crate::chain::FrameGuard) on every
//! exit path, so the stack never needs locking and never leaks a frame.

use crate::relation::RelationClass;

/// One frame of the security stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityFrame {
    /// Effective relation for code running in this frame
    pub relation: RelationClass,
    /// Whether the relation was inherited from the enclosing frame
    pub passthru: bool,
}

/// Stack of security frames for a single call chain
#[derive(Debug, Clone, Default)]
pub struct SecurityStack {
    frames: Vec<SecurityFrame>,
}

impl SecurityStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self {
            frames: Vec::with_capacity(32),
        }
    }

    /// Push a frame for an invocation classified as `relation`
    ///
    /// When `passthru` is set the frame takes the relation of the nearest
    /// enclosing frame instead, or `External` on an empty stack.
    pub fn push(&mut self, relation: RelationClass, passthru: bool) -> SecurityFrame {
        let effective = if passthru { self.current() } else { relation };
        let frame = SecurityFrame {
            relation: effective,
            passthru,
        };
        self.frames.push(frame);
        frame
    }

    /// Pop the top frame
    pub fn pop(&mut self) -> Option<SecurityFrame> {
        self.frames.pop()
    }

    /// Effective relation of the top frame (`External` when empty)
    #[inline]
    pub fn current(&self) -> RelationClass {
        self.frames
            .last()
            .map(|frame| frame.relation)
            .unwrap_or(RelationClass::External)
    }

    /// Number of active frames
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Check for an empty stack
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
