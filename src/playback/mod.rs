//! Sequence playback: frame clock, player state machine, output buffer,
//! and the local autoplay fallback

pub mod autoplay;
pub mod clock;
pub mod output;
pub mod player;

pub use autoplay::AutoplayFallbackController;
pub use clock::{frame_for_time, snap_reference, PlaybackClock, DRIFT_TOLERANCE_FRAMES};
pub use output::{ActivityWatchdog, OutputBuffer};
pub use player::{
    PlaybackSession, PlayerState, PollOutcome, SequencePlayer, StartOutcome, StopReason,
};
