//! Lifecycle token shared by a hook and everything it spawns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Tracks whether the owning context is still active.
///
/// Active from construction until [`deactivate`](Self::deactivate). Clones
/// share the flag; every resumption point (router entry, simulation timer,
/// dispatch acknowledgement) checks it before touching state or calling back.
#[derive(Debug, Clone)]
pub struct LifecycleGuard {
    active: Arc<AtomicBool>,
}

impl LifecycleGuard {
    /// Create an active guard
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the owning context is still active
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Mark the context as torn down.
    ///
    /// Returns `true` only for the call that actually flipped the flag.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}
