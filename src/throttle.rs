use std::{sync::Mutex, time::Duration};

use tokio::time::Instant;

#[derive(Debug, Default)]
struct ThrottleState {
    last_publish: Option<Instant>,
    in_flight: bool,
}

/// Rate limiter between the ~60 Hz upstream feed and the lighting network.
///
/// [`ThrottleGate::should_publish`] reserves the slot; the caller then either
/// [`confirm`](ThrottleGate::confirm)s it once a publish went out, or
/// [`release`](ThrottleGate::release)s it so the next sample may try again.
/// Only confirmed publishes move the window.
#[derive(Debug, Default)]
pub struct ThrottleGate {
    state: Mutex<ThrottleState>,
}

impl ThrottleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// The interval is passed in per call so configuration changes apply to
    /// the very next decision. Missed intervals are never caught up.
    pub fn should_publish(&self, now: Instant, interval: Duration) -> bool {
        let mut state = self.lock();

        if state.in_flight {
            return false;
        }

        let elapsed_enough = state
            .last_publish
            .map(|last| now.saturating_duration_since(last) >= interval)
            .unwrap_or(true);

        if elapsed_enough {
            state.in_flight = true;
        }

        elapsed_enough
    }

    /// Records a publish that reached at least one device.
    pub fn confirm(&self, published_at: Instant) {
        let mut state = self.lock();
        state.last_publish = Some(published_at);
        state.in_flight = false;
    }

    /// Gives the slot back without recording a publish.
    pub fn release(&self) {
        self.lock().in_flight = false;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ThrottleState> {
        // Two plain fields, never left half-written
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
