//! Single-slot hand-off between the preview producer and HTTP consumers.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One published JPEG.
#[derive(Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Publication number, starting at 1.
    pub sequence: u64,
    /// JPEG bytes.
    pub jpeg: Vec<u8>,
}

#[derive(Debug, Default)]
struct SlotState {
    latest: Option<Arc<EncodedFrame>>,
    published: u64,
    closed: bool,
}

/// Holds only the most recent frame. Readers never see a partial frame and
/// never queue stale ones.
#[derive(Debug, Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    fresh: Condvar,
}

impl FrameSlot {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the current frame and wake every waiting reader. Returns the
    /// new frame's sequence number.
    pub fn publish(&self, jpeg: Vec<u8>) -> u64 {
        let mut state = self.lock();
        state.published += 1;
        let sequence = state.published;
        state.latest = Some(Arc::new(EncodedFrame { sequence, jpeg }));
        drop(state);
        self.fresh.notify_all();
        sequence
    }

    /// Most recent frame, if any was published.
    pub fn latest(&self) -> Option<Arc<EncodedFrame>> {
        self.lock().latest.clone()
    }

    /// Frames published so far.
    pub fn published(&self) -> u64 {
        self.lock().published
    }

    /// Block until a frame newer than `after` exists, the slot is closed,
    /// or `timeout` elapses.
    pub fn wait_newer(&self, after: u64, timeout: Duration) -> Option<Arc<EncodedFrame>> {
        let guard = self.lock();
        let (guard, _) = self
            .fresh
            .wait_timeout_while(guard, timeout, |state| {
                !state.closed && state.published <= after
            })
            .unwrap_or_else(PoisonError::into_inner);
        guard
            .latest
            .as_ref()
            .filter(|frame| frame.sequence > after)
            .map(Arc::clone)
    }

    /// Stop the slot; waiting readers return immediately.
    pub fn close(&self) {
        self.lock().closed = true;
        self.fresh.notify_all();
    }

    /// Whether [`FrameSlot::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
