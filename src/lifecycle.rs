//! Destroy-once discipline
//!
//! Outlets, inlets and continuous resolvers own exactly one engine handle
//! each, reachable through two cleanup paths: an explicit `destroy()` and a
//! `Drop` backstop. This guard makes whichever path runs first win, and the
//! other a no-op, so teardown happens exactly once and never panics.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Exactly-once destruction guard shared by all handle-owning types
#[derive(Debug)]
pub(crate) struct Lifecycle {
    destroyed: AtomicBool,
    what: &'static str,
}

impl Lifecycle {
    pub(crate) fn new(what: &'static str) -> Self {
        Self {
            destroyed: AtomicBool::new(false),
            what,
        }
    }

    /// Claim the right to destroy; true for the first caller only
    pub(crate) fn begin_destroy(&self) -> bool {
        !self.destroyed.swap(true, Ordering::AcqRel)
    }

    /// Whether destruction already happened
    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Error out if this handle was already destroyed
    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(Error::Destroyed(self.what))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_destroy_wins() {
        let guard = Lifecycle::new("outlet");
        assert!(guard.begin_destroy());
        assert!(!guard.begin_destroy());
        assert!(!guard.begin_destroy());
    }

    #[test]
    fn test_ensure_alive_after_destroy() {
        let guard = Lifecycle::new("inlet");
        assert!(guard.ensure_alive().is_ok());
        guard.begin_destroy();
        assert!(matches!(guard.ensure_alive(), Err(Error::Destroyed("inlet"))));
    }
}
