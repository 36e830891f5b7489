//! Shared channel buffer handed to the renderer, and the activity watchdog
//! that tells the rest of the device fresh frame data is flowing

/// Fixed-size channel intensity buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBuffer {
    channels: Vec<u8>,
}

impl OutputBuffer {
    pub fn new(channel_count: usize) -> Self {
        Self {
            channels: vec![0; channel_count],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.channels
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Zero every channel
    pub fn blank(&mut self) {
        self.channels.fill(0);
    }

    pub fn is_blank(&self) -> bool {
        self.channels.iter().all(|&c| c == 0)
    }
}

/// Tracks when the last frame was produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityWatchdog {
    last_activity: Option<u64>,
}

impl ActivityWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// New data was written at `now`
    pub fn reset(&mut self, now: u64) {
        self.last_activity = Some(now);
    }

    /// Forget the last activity, e.g. after the output was blanked
    pub fn clear(&mut self) {
        self.last_activity = None;
    }

    pub fn last_activity(&self) -> Option<u64> {
        self.last_activity
    }

    /// Milliseconds since the last frame, if there ever was one
    pub fn idle_ms(&self, now: u64) -> Option<u64> {
        self.last_activity.map(|t| now.saturating_sub(t))
    }

    /// True once `timeout_ms` has passed without activity. A zero timeout
    /// never expires.
    pub fn expired(&self, now: u64, timeout_ms: u64) -> bool {
        timeout_ms > 0 && self.idle_ms(now).is_some_and(|idle| idle >= timeout_ms)
    }
}
