//! Single-holder gate for the background broker replay.

use std::sync::atomic::{AtomicBool, Ordering};

/// Allows at most one broker-outbox replay pass at a time.
///
/// The gate is idle when no pass is running. A pass claims it with a
/// compare-and-swap and releases it when its [`RetryGuard`] drops, including
/// when the pass panics. The online send path never consults the gate.
#[derive(Debug)]
pub struct RetryGate {
    idle: AtomicBool,
}

impl RetryGate {
    pub fn new() -> Self {
        Self {
            idle: AtomicBool::new(true),
        }
    }

    /// Claim the gate. Returns `None` while another pass holds it.
    pub fn try_acquire(&self) -> Option<RetryGuard<'_>> {
        self.idle
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RetryGuard { gate: self })
    }

    /// True when no replay pass holds the gate.
    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Acquire)
    }
}

impl Default for RetryGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of holding the [`RetryGate`]; releases it on drop.
#[derive(Debug)]
pub struct RetryGuard<'a> {
    gate: &'a RetryGate,
}

impl Drop for RetryGuard<'_> {
    fn drop(&mut self) {
        self.gate.idle.store(true, Ordering::Release);
    }
}
