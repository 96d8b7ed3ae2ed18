//! Cooperative stop signal shared by the runner and its workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A flag raised at most once, never lowered.
///
/// Workers poll it between jobs; it never aborts an in-flight exchange.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns `true` only for the call that raised it.
    pub fn raise(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
