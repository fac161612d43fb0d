//! Cooperative cancellation flag
//!
//! Written by the request's handle, read by the worker before evaluating and
//! by the origin before reconciling. Setting it never interrupts a store call
//! already in progress; it only suppresses what would follow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, one-way cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create an unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns true if this call was the one that set it.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    /// Whether the flag has been set on any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_one_way() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let worker_side = token.clone();
        token.cancel();
        assert!(worker_side.is_cancelled());
    }

    #[test]
    fn test_visible_across_threads() {
        let token = CancellationToken::new();
        let remote = token.clone();
        std::thread::spawn(move || {
            remote.cancel();
        })
        .join()
        .unwrap();
        assert!(token.is_cancelled());
    }
}
