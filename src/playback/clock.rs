//! Wall-clock to frame mapping
//!
//! Times are milliseconds on a monotonic clock. The start reference is
//! signed because snapping to a late frame shortly after boot puts it
//! before time zero.

/// Drift (in frames) tolerated before a sync snaps the clock
pub const DRIFT_TOLERANCE_FRAMES: u32 = 2;

/// `floor((now - start) / step)`, with `step` floored to 1 and times
/// before the reference mapping to frame 0
pub fn frame_for_time(now: u64, start_reference: i64, step_ms: u32) -> u32 {
    let step = i64::from(step_ms.max(1));
    let elapsed = now as i64 - start_reference;
    if elapsed <= 0 {
        return 0;
    }
    (elapsed / step).min(i64::from(u32::MAX)) as u32
}

/// Start reference that makes `target` the current frame at `now`
pub fn snap_reference(now: u64, target: u32, step_ms: u32) -> i64 {
    now as i64 - i64::from(target) * i64::from(step_ms.max(1))
}

/// Frame clock for one playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackClock {
    start_reference: i64,
    step_ms: u32,
}

impl PlaybackClock {
    /// A clock on which `frame` is current at `now`
    pub fn starting_at(now: u64, frame: u32, step_ms: u32) -> Self {
        let step_ms = step_ms.max(1);
        Self {
            start_reference: snap_reference(now, frame, step_ms),
            step_ms,
        }
    }

    pub fn frame_at(&self, now: u64) -> u32 {
        frame_for_time(now, self.start_reference, self.step_ms)
    }

    pub fn snap(&mut self, now: u64, frame: u32) {
        self.start_reference = snap_reference(now, frame, self.step_ms);
    }

    /// Restart from frame 0 at `now`
    pub fn restart(&mut self, now: u64) {
        self.start_reference = now as i64;
    }

    /// Snap to `reported` only when `local` is more than
    /// [`DRIFT_TOLERANCE_FRAMES`] away from it. Returns whether it snapped.
    pub fn correct_drift(&mut self, now: u64, local: u32, reported: u32) -> bool {
        if local.abs_diff(reported) > DRIFT_TOLERANCE_FRAMES {
            tracing::debug!("Drift correction: local frame {} -> {}", local, reported);
            self.snap(now, reported);
            true
        } else {
            false
        }
    }

    pub fn start_reference(&self) -> i64 {
        self.start_reference
    }

    pub fn step_ms(&self) -> u32 {
        self.step_ms
    }
}
