use std::sync::atomic::{AtomicBool, Ordering};

/// Single-fire completion signal
///
/// Completion may be detected several times while late arrivals are still
/// being processed; only the first [`fire`](CompletionGate::fire) has any
/// effect.
#[derive(Debug, Default)]
pub struct CompletionGate {
    fired: AtomicBool,
}

impl CompletionGate {
    /// Create an unfired gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the gate, returning `true` only for the first call
    pub fn fire(&self) -> bool {
        !self.fired.swap(true, Ordering::SeqCst)
    }

    /// Whether the gate has fired
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}
