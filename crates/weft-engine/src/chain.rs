//! Call chains
//!
//! A call chain is one logical thread of execution: it owns a security
//! frame stack, the trace of what ran, and a cancellation flag. Chains are
//! never shared; run independent chains to get parallelism.

use crate::relation::RelationClass;
use crate::security::{SecurityFrame, SecurityStack};
use crate::weave::TraceEvent;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation flag shared between a chain and whoever may cancel it
///
/// Cancelling does not interrupt anything by itself: the running body sees
/// a `Cancelled` fault at its next checkpoint or nested invocation.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Per-chain execution state
#[derive(Debug)]
pub struct CallChain {
    /// Security frames of the active invocations
    pub(crate) security: SecurityStack,
    trace: Vec<TraceEvent>,
    tracing: bool,
    cancel: CancelHandle,
}

impl CallChain {
    /// Create a chain; `tracing` controls whether events are recorded
    pub fn new(tracing: bool) -> Self {
        Self {
            security: SecurityStack::new(),
            trace: Vec::new(),
            tracing,
            cancel: CancelHandle::default(),
        }
    }

    /// Relation in force for code currently running on this chain
    pub fn current(&self) -> RelationClass {
        self.security.current()
    }

    /// Number of active invocations
    pub fn depth(&self) -> usize {
        self.security.depth()
    }

    /// Handle that can cancel this chain from elsewhere
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Events recorded so far
    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    /// Take the recorded events, leaving the trace empty
    pub fn take_trace(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.trace)
    }

    pub(crate) fn record(&mut self, event: TraceEvent) {
        if self.tracing {
            self.trace.push(event);
        }
    }

    /// Push a security frame; it is popped when the guard drops
    pub fn enter(&mut self, relation: RelationClass, passthru: bool) -> FrameGuard<'_> {
        let frame = self.security.push(relation, passthru);
        FrameGuard { chain: self, frame }
    }
}

/// RAII guard for one security frame
///
/// Dereferences to the chain so nested invocations can keep using it; the
/// frame is popped on drop, including fault and panic unwinds.
pub struct FrameGuard<'a> {
    chain: &'a mut CallChain,
    frame: SecurityFrame,
}

impl FrameGuard<'_> {
    /// The frame this guard owns
    pub fn frame(&self) -> SecurityFrame {
        self.frame
    }
}

impl Deref for FrameGuard<'_> {
    type Target = CallChain;

    fn deref(&self) -> &CallChain {
        self.chain
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut CallChain {
        self.chain
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.chain.security.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_pops_on_drop() {
        let mut chain = CallChain::new(true);
        {
            let mut outer = chain.enter(RelationClass::SameModule, false);
            assert_eq!(outer.current(), RelationClass::SameModule);
            {
                let inner = outer.enter(RelationClass::SameInstance, true);
                assert_eq!(inner.frame().relation, RelationClass::SameModule);
                assert_eq!(inner.depth(), 2);
            }
            assert_eq!(outer.depth(), 1);
        }
        assert_eq!(chain.depth(), 0);
        assert_eq!(chain.current(), RelationClass::External);
    }

    #[test]
    fn test_guard_pops_on_panic() {
        let mut chain = CallChain::new(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = chain.enter(RelationClass::DerivedType, false);
            panic!("body blew up");
        }));
        assert!(result.is_err());
        assert_eq!(chain.depth(), 0);
    }

    #[test]
    fn test_cancel_handle() {
        let chain = CallChain::new(false);
        let handle = chain.cancel_handle();
        assert!(!chain.is_cancelled());
        std::thread::spawn(move || handle.cancel()).join().unwrap();
        assert!(chain.is_cancelled());
    }

    #[test]
    fn test_tracing_disabled_records_nothing() {
        let mut chain = CallChain::new(false);
        chain.record(TraceEvent::Exit {
            member: crate::registry::MemberId::from_index(0),
        });
        assert!(chain.trace().is_empty());
    }
}
