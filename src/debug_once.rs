//! Debug-only exactly-once tracker.
//!
//! Records that a one-shot step (destroying the managed object of a control
//! block) has happened. In debug builds, firing twice panics. In release
//! builds, this compiles to a zero-cost no-op.

#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-block tracker. Embed this in structs and call `fire` right before the
/// step that must not repeat.
#[derive(Debug)]
pub(crate) struct DebugOnce {
    #[cfg(debug_assertions)]
    fired: AtomicBool,
}

impl DebugOnce {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            fired: AtomicBool::new(false),
        }
    }

    /// Mark the step as done. In debug builds, panics if it already was.
    #[inline]
    pub(crate) fn fire(&self, what: &'static str) {
        #[cfg(debug_assertions)]
        {
            let already = self.fired.swap(true, Ordering::Relaxed);
            assert!(!already, "{what} ran twice on the same control block");
        }

        #[cfg(not(debug_assertions))]
        {
            let _ = what;
        }
    }

    /// Whether `fire` has been called. Always false in release builds.
    #[inline]
    pub(crate) fn has_fired(&self) -> bool {
        #[cfg(debug_assertions)]
        {
            self.fired.load(Ordering::Relaxed)
        }

        #[cfg(not(debug_assertions))]
        {
            false
        }
    }
}

impl Default for DebugOnce {
    fn default() -> Self {
        Self::new()
    }
}
