//! Notification batching
//!
//! Streaming deltas arrive far faster than a view can usefully redraw. Deltas
//! only mark a notification as pending; a periodic tick (driven by
//! [`crate::EngineRunner`], or by the caller) turns at most one pending mark
//! into a notification. Closing a message or resetting drains the batcher so
//! the last delta is always announced.

/// Coalesces delta notifications between ticks
#[derive(Debug, Default)]
pub struct NotifyBatcher {
    pending: bool,
    armed: bool,
}

impl NotifyBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delta. Returns `true` if this call armed the timer.
    pub fn note_delta(&mut self) -> bool {
        self.pending = true;
        !std::mem::replace(&mut self.armed, true)
    }

    /// Periodic tick. Returns `true` if a notification is due.
    pub fn tick(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    /// Stop the timer. Returns `true` if a notification was still pending.
    pub fn drain(&mut self) -> bool {
        self.armed = false;
        std::mem::take(&mut self.pending)
    }

    /// Whether the timer should be running
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_delta_arms() {
        let mut batcher = NotifyBatcher::new();
        assert!(!batcher.is_armed());
        assert!(batcher.note_delta());
        assert!(!batcher.note_delta());
        assert!(batcher.is_armed());
    }

    #[test]
    fn test_tick_coalesces() {
        let mut batcher = NotifyBatcher::new();
        batcher.note_delta();
        batcher.note_delta();
        batcher.note_delta();
        assert!(batcher.tick());
        assert!(!batcher.tick());
        assert!(batcher.is_armed());
    }

    #[test]
    fn test_drain_flushes_and_disarms() {
        let mut batcher = NotifyBatcher::new();
        batcher.note_delta();
        assert!(batcher.drain());
        assert!(!batcher.is_armed());
        assert!(!batcher.is_pending());
        assert!(!batcher.drain());
    }

    #[test]
    fn test_drain_after_tick_has_nothing() {
        let mut batcher = NotifyBatcher::new();
        batcher.note_delta();
        batcher.tick();
        assert!(!batcher.drain());
    }
}
