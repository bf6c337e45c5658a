//! Monotonic millisecond clock used for frame timestamps.

use std::time::Instant;

/// Milliseconds since the node came up, wrapping at `u32::MAX`.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Current timestamp in milliseconds.
    pub fn now_ms(&self) -> u32 {
        // Truncation is the wrap-around.
        self.epoch.elapsed().as_millis() as u32
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
