//! Sequence player
//!
//! Owns at most one playback session and turns clock ticks into frame reads
//! into the shared output buffer.
//!
//! ```text
//!            start (file opens)
//!   ┌──────┐ ─────────────────────▶ ┌─────────┐ ──┐ poll: new frame / repeat
//!   │ Idle │                        │ Playing │ ◀─┘ sync: drift snap
//!   └──────┘ ◀───────────────────── └─────────┘
//!            stop / end of sequence / short read
//! ```

use std::sync::Arc;

use crate::constants::REMOTE_PLAY_SENTINEL;
use crate::error::SequenceError;
use crate::sequence::SequenceFile;
use crate::storage::SequenceStore;

use super::clock::PlaybackClock;
use super::output::{ActivityWatchdog, OutputBuffer};

/// State of one playback attempt
#[derive(Debug)]
pub struct PlaybackSession {
    file: SequenceFile,
    clock: PlaybackClock,
    /// Last frame written to the output; `None` until the first read
    current_frame: Option<u32>,
    frame_count: u32,
    channel_count: u32,
    data_offset: u16,
    repeats_remaining: u32,
}

impl PlaybackSession {
    fn new(file: SequenceFile, now: u64, start_frame: u32, repeats: u32) -> Self {
        let header = file.header().clone();
        Self {
            clock: PlaybackClock::starting_at(now, start_frame, header.step_time()),
            file,
            current_frame: None,
            frame_count: header.frame_count,
            channel_count: header.channel_count,
            data_offset: header.data_offset,
            repeats_remaining: repeats,
        }
    }

    pub fn name(&self) -> &str {
        self.file.name()
    }

    pub fn current_frame(&self) -> Option<u32> {
        self.current_frame
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    pub fn data_offset(&self) -> u16 {
        self.data_offset
    }

    pub fn step_ms(&self) -> u32 {
        self.clock.step_ms()
    }

    pub fn repeats_remaining(&self) -> u32 {
        self.repeats_remaining
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    /// Playing time up to the current frame
    pub fn elapsed_ms(&self) -> u64 {
        u64::from(self.current_frame.unwrap_or(0)) * u64::from(self.step_ms())
    }

    pub fn duration_ms(&self) -> u64 {
        u64::from(self.frame_count) * u64::from(self.step_ms())
    }
}

/// Player state: a tagged variant instead of per-state objects
#[derive(Debug)]
pub enum PlayerState {
    Idle,
    Playing(PlaybackSession),
}

/// Why the last session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit stop, or replaced by another start
    Requested,
    /// Ran past the last frame with no repeats left
    EndOfSequence,
    /// A frame read came back short
    ShortRead,
    /// The storage returned an error mid-playback
    ReadError,
}

/// Result of one poll tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing is playing
    Idle,
    /// Still inside the current frame's window; no I/O done
    Waiting,
    /// A new frame was written to the output
    Advanced(u32),
    /// The session ended normally
    Finished,
    /// The session was stopped because a frame could not be read
    Failed,
}

/// Result of a start request that did not fail to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Already playing this file; position untouched
    AlreadyPlaying,
    /// Empty name or the "no file" sentinel
    Ignored,
    /// This file failed validation before and has not been replaced
    Refused,
}

/// Plays one sequence at a time into an owned output buffer
pub struct SequencePlayer {
    store: Arc<dyn SequenceStore>,
    state: PlayerState,
    output: OutputBuffer,
    watchdog: ActivityWatchdog,
    /// Name of the most recent file that failed validation
    sticky_failure: Option<String>,
    last_stop: Option<StopReason>,
}

impl SequencePlayer {
    pub fn new(store: Arc<dyn SequenceStore>, output_channels: usize) -> Self {
        Self {
            store,
            state: PlayerState::Idle,
            output: OutputBuffer::new(output_channels),
            watchdog: ActivityWatchdog::new(),
            sticky_failure: None,
            last_stop: None,
        }
    }

    /// Start `name` at frame `frame` with no repeats
    pub fn start(
        &mut self,
        name: &str,
        frame: u32,
        now: u64,
    ) -> Result<StartOutcome, SequenceError> {
        self.start_with_repeats(name, frame, 0, now)
    }

    /// Start `name` at `frame`, replaying it `repeats` more times after the
    /// first pass.
    ///
    /// The new file is opened before the current session is touched, so a
    /// rejected file leaves any running session exactly as it was.
    pub fn start_with_repeats(
        &mut self,
        name: &str,
        frame: u32,
        repeats: u32,
        now: u64,
    ) -> Result<StartOutcome, SequenceError> {
        if name.is_empty() || name == REMOTE_PLAY_SENTINEL {
            return Ok(StartOutcome::Ignored);
        }

        if self.playing_name() == Some(name) {
            return Ok(StartOutcome::AlreadyPlaying);
        }

        if self.sticky_failure.as_deref() == Some(name) {
            tracing::debug!("Not retrying '{}', it failed to open before", name);
            return Ok(StartOutcome::Refused);
        }
        self.sticky_failure = None;

        let file = match SequenceFile::open(self.store.as_ref(), name) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("Could not start '{}': {}", name, e);
                if e.is_invalid_file() {
                    self.sticky_failure = Some(name.to_string());
                }
                return Err(e);
            }
        };

        self.stop_with(StopReason::Requested);

        let session = PlaybackSession::new(file, now, frame, repeats);
        tracing::info!(
            "Playing '{}' from frame {} ({} frames, {} channels, {}ms step)",
            name,
            frame,
            session.frame_count,
            session.channel_count,
            session.step_ms()
        );
        self.state = PlayerState::Playing(session);
        Ok(StartOutcome::Started)
    }

    /// End the session (if any) and blank the output
    pub fn stop(&mut self) {
        self.stop_with(StopReason::Requested);
    }

    fn stop_with(&mut self, reason: StopReason) {
        let previous = std::mem::replace(&mut self.state, PlayerState::Idle);
        if let PlayerState::Playing(session) = previous {
            tracing::info!("Stopped '{}' ({:?})", session.name(), reason);
            session.file.close();
            self.last_stop = Some(reason);
        }
        self.output.blank();
    }

    /// Advance playback to the frame due at `now`
    pub fn poll(&mut self, now: u64) -> PollOutcome {
        let PlayerState::Playing(session) = &mut self.state else {
            return PollOutcome::Idle;
        };

        let mut target = session.clock.frame_at(now);
        if target >= session.frame_count {
            if session.repeats_remaining == 0 {
                self.stop_with(StopReason::EndOfSequence);
                return PollOutcome::Finished;
            }

            session.repeats_remaining -= 1;
            session.clock.restart(now);
            session.current_frame = None;
            target = 0;
            tracing::info!(
                "Repeating '{}' ({} repeats left)",
                session.name(),
                session.repeats_remaining
            );
        }

        if session.current_frame == Some(target) {
            return PollOutcome::Waiting;
        }

        let expected = session.file.frame_read_len(self.output.len());
        let failure = match session.file.read_frame(target, self.output.as_mut_slice()) {
            Ok(n) if n == expected => {
                session.current_frame = Some(target);
                self.watchdog.reset(now);
                return PollOutcome::Advanced(target);
            }
            Ok(n) => {
                tracing::warn!(
                    "'{}' frame {}: {}",
                    session.name(),
                    target,
                    SequenceError::ShortRead {
                        expected,
                        actual: n
                    }
                );
                StopReason::ShortRead
            }
            Err(e) => {
                tracing::warn!("'{}' frame {}: {}", session.name(), target, e);
                StopReason::ReadError
            }
        };

        self.stop_with(failure);
        PollOutcome::Failed
    }

    /// Apply the drift policy against a leader-reported frame, measured
    /// from the last frame written (or the clock before the first read).
    /// Returns whether the clock was snapped.
    pub fn sync(&mut self, frame: u32, now: u64) -> bool {
        match &mut self.state {
            PlayerState::Playing(session) => {
                let local = session
                    .current_frame
                    .unwrap_or_else(|| session.clock.frame_at(now));
                session.clock.correct_drift(now, local, frame)
            }
            PlayerState::Idle => false,
        }
    }

    /// Zero the output without touching playback state
    pub fn blank(&mut self) {
        self.output.blank();
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        match &self.state {
            PlayerState::Playing(session) => Some(session),
            PlayerState::Idle => None,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlayerState::Playing(_))
    }

    pub fn is_idle(&self) -> bool {
        !self.is_playing()
    }

    pub fn playing_name(&self) -> Option<&str> {
        self.session().map(PlaybackSession::name)
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn watchdog(&self) -> &ActivityWatchdog {
        &self.watchdog
    }

    pub fn watchdog_mut(&mut self) -> &mut ActivityWatchdog {
        &mut self.watchdog
    }

    pub fn sticky_failure(&self) -> Option<&str> {
        self.sticky_failure.as_deref()
    }

    pub fn last_stop_reason(&self) -> Option<StopReason> {
        self.last_stop
    }

    pub fn store(&self) -> &Arc<dyn SequenceStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::testing::{frame_byte, SequenceBuilder};
    use crate::storage::{MemoryStore, StoredFile};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts opens and reads on top of a memory store
    struct CountingStore {
        inner: MemoryStore,
        opens: Arc<AtomicUsize>,
        reads: Arc<AtomicUsize>,
    }

    struct CountingFile {
        inner: Box<dyn StoredFile>,
        reads: Arc<AtomicUsize>,
    }

    impl StoredFile for CountingFile {
        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            self.inner.read_at(offset, buf)
        }

        fn len(&self) -> u64 {
            self.inner.len()
        }
    }

    impl SequenceStore for CountingStore {
        fn is_available(&self) -> bool {
            true
        }

        fn open(&self, name: &str) -> io::Result<Box<dyn StoredFile>> {
            self.opens.fetch_add(1, Ordering::Relaxed);
            let inner = self.inner.open(name)?;
            Ok(Box::new(CountingFile {
                inner,
                reads: self.reads.clone(),
            }))
        }
    }

    struct Fixture {
        player: SequencePlayer,
        opens: Arc<AtomicUsize>,
        reads: Arc<AtomicUsize>,
    }

    fn fixture(files: Vec<(&str, Vec<u8>)>, output: usize) -> Fixture {
        let inner = MemoryStore::new();
        for (name, bytes) in files {
            inner.insert(name, bytes);
        }
        let opens = Arc::new(AtomicUsize::new(0));
        let reads = Arc::new(AtomicUsize::new(0));
        let store = CountingStore {
            inner,
            opens: opens.clone(),
            reads: reads.clone(),
        };
        Fixture {
            player: SequencePlayer::new(Arc::new(store), output),
            opens,
            reads,
        }
    }

    #[test]
    fn test_start_and_poll_frames() {
        let mut f = fixture(vec![("show1.fseq", SequenceBuilder::new(4, 10).build())], 4);
        let p = &mut f.player;

        assert_eq!(p.start("show1.fseq", 0, 1_000).unwrap(), StartOutcome::Started);
        assert!(p.is_playing());

        assert_eq!(p.poll(1_000), PollOutcome::Advanced(0));
        assert_eq!(p.output().as_slice(), &[frame_byte(0); 4]);
        assert_eq!(p.watchdog().last_activity(), Some(1_000));

        assert_eq!(p.poll(1_125), PollOutcome::Advanced(2));
        assert_eq!(p.output().as_slice(), &[frame_byte(2); 4]);
    }

    #[test]
    fn test_same_frame_window_does_no_io() {
        let mut f = fixture(vec![("a.fseq", SequenceBuilder::new(4, 10).build())], 4);
        f.player.start("a.fseq", 0, 0).unwrap();
        let after_open = f.reads.load(Ordering::Relaxed);

        assert_eq!(f.player.poll(10), PollOutcome::Advanced(0));
        assert_eq!(f.player.poll(20), PollOutcome::Waiting);
        assert_eq!(f.player.poll(49), PollOutcome::Waiting);
        assert_eq!(f.reads.load(Ordering::Relaxed), after_open + 1);
    }

    #[test]
    fn test_start_at_requested_frame() {
        let mut f = fixture(vec![("a.fseq", SequenceBuilder::new(2, 100).build())], 2);
        f.player.start("a.fseq", 40, 500).unwrap();
        assert_eq!(f.player.poll(500), PollOutcome::Advanced(40));
        assert_eq!(f.player.output().as_slice(), &[frame_byte(40); 2]);
    }

    #[test]
    fn test_repeats_produce_full_passes() {
        let bytes = SequenceBuilder::new(3, 300).step_time(50).build();
        let mut f = fixture(vec![("loop.fseq", bytes)], 3);
        f.player.start_with_repeats("loop.fseq", 0, 2, 0).unwrap();

        let mut advances = 0;
        let mut now = 0;
        loop {
            match f.player.poll(now) {
                PollOutcome::Advanced(_) => advances += 1,
                PollOutcome::Finished => break,
                PollOutcome::Waiting => {}
                other => panic!("unexpected {:?}", other),
            }
            now += 50;
        }

        assert_eq!(advances, 900);
        assert!(f.player.is_idle());
        assert_eq!(f.player.last_stop_reason(), Some(StopReason::EndOfSequence));
        assert!(f.player.output().is_blank());
    }

    #[test]
    fn test_short_read_stops_and_blanks() {
        // Three frames declared, the last one cut in half
        let bytes = SequenceBuilder::new(8, 3).build();
        let cut = bytes.len() - 4;
        let mut f = fixture(vec![("cut.fseq", bytes[..cut].to_vec())], 8);

        f.player.start("cut.fseq", 0, 0).unwrap();
        assert_eq!(f.player.poll(0), PollOutcome::Advanced(0));
        assert_eq!(f.player.poll(50), PollOutcome::Advanced(1));
        assert!(!f.player.output().is_blank());

        assert_eq!(f.player.poll(100), PollOutcome::Failed);
        assert!(f.player.is_idle());
        assert!(f.player.output().is_blank());
        assert_eq!(f.player.last_stop_reason(), Some(StopReason::ShortRead));
    }

    #[test]
    fn test_restart_same_file_is_noop() {
        let mut f = fixture(vec![("show1.fseq", SequenceBuilder::new(4, 100).build())], 4);
        f.player.start("show1.fseq", 0, 0).unwrap();
        f.player.poll(260);
        let frame = f.player.session().unwrap().current_frame();
        let reference = f.player.session().unwrap().clock().start_reference();

        assert_eq!(
            f.player.start("show1.fseq", 0, 300).unwrap(),
            StartOutcome::AlreadyPlaying
        );
        assert_eq!(
            f.player.start("show1.fseq", 0, 310).unwrap(),
            StartOutcome::AlreadyPlaying
        );

        let session = f.player.session().unwrap();
        assert_eq!(session.current_frame(), frame);
        assert_eq!(session.clock().start_reference(), reference);
        assert_eq!(f.opens.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_sticky_failure() {
        let mut f = fixture(
            vec![
                ("bad.fseq", SequenceBuilder::new(4, 10).compression(1).build()),
                ("good.fseq", SequenceBuilder::new(4, 10).build()),
            ],
            4,
        );

        assert!(matches!(
            f.player.start("bad.fseq", 0, 0),
            Err(SequenceError::UnsupportedFormat { .. })
        ));
        assert_eq!(f.player.sticky_failure(), Some("bad.fseq"));
        assert!(f.player.is_idle());

        assert_eq!(f.player.start("bad.fseq", 0, 10).unwrap(), StartOutcome::Refused);
        assert_eq!(f.opens.load(Ordering::Relaxed), 1);

        assert_eq!(f.player.start("good.fseq", 0, 20).unwrap(), StartOutcome::Started);
        assert_eq!(f.player.sticky_failure(), None);

        // Cleared, so the broken file is attempted again
        assert!(f.player.start("bad.fseq", 0, 30).is_err());
        assert_eq!(f.opens.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_rejected_file_leaves_session_untouched() {
        let mut f = fixture(
            vec![
                ("good.fseq", SequenceBuilder::new(4, 100).build()),
                ("v1.fseq", SequenceBuilder::new(4, 100).version(1, 0).build()),
            ],
            4,
        );
        f.player.start("good.fseq", 5, 0).unwrap();
        f.player.poll(0);

        assert!(f.player.start("v1.fseq", 0, 10).is_err());
        let session = f.player.session().unwrap();
        assert_eq!(session.name(), "good.fseq");
        assert_eq!(session.current_frame(), Some(5));
        assert_eq!(f.player.output().as_slice(), &[frame_byte(5); 4]);
    }

    #[test]
    fn test_start_replaces_running_session() {
        let mut f = fixture(
            vec![
                ("a.fseq", SequenceBuilder::new(4, 100).build()),
                ("b.fseq", SequenceBuilder::new(4, 100).build()),
            ],
            4,
        );
        f.player.start("a.fseq", 0, 0).unwrap();
        f.player.start("b.fseq", 0, 10).unwrap();
        assert_eq!(f.player.playing_name(), Some("b.fseq"));
        assert_eq!(f.player.last_stop_reason(), Some(StopReason::Requested));
    }

    #[test]
    fn test_ignored_names() {
        let mut f = fixture(vec![], 4);
        assert_eq!(f.player.start("", 0, 0).unwrap(), StartOutcome::Ignored);
        assert_eq!(f.player.start("...", 0, 0).unwrap(), StartOutcome::Ignored);
        assert_eq!(f.opens.load(Ordering::Relaxed), 0);
        assert_eq!(f.player.sticky_failure(), None);
    }

    #[test]
    fn test_sync_snaps_only_past_tolerance() {
        let mut f = fixture(vec![("a.fseq", SequenceBuilder::new(4, 1_000).build())], 4);
        assert!(!f.player.sync(10, 0));

        f.player.start("a.fseq", 0, 0).unwrap();
        assert!(!f.player.sync(11, 500));
        assert!(f.player.sync(15, 500));
        assert_eq!(f.player.poll(500), PollOutcome::Advanced(15));
    }

    #[test]
    fn test_sync_measures_from_last_written_frame() {
        let mut f = fixture(vec![("a.fseq", SequenceBuilder::new(4, 1_000).build())], 4);
        f.player.start("a.fseq", 0, 0).unwrap();
        assert_eq!(f.player.poll(100), PollOutcome::Advanced(2));

        // Polling stalled: the clock says 10 but frame 2 is what went out
        assert!(f.player.sync(10, 500));
        assert_eq!(f.player.session().unwrap().clock().frame_at(500), 10);

        assert_eq!(f.player.poll(500), PollOutcome::Advanced(10));
        assert!(!f.player.sync(11, 520));
    }

    #[test]
    fn test_stop_and_blank() {
        let mut f = fixture(vec![("a.fseq", SequenceBuilder::new(4, 10).build())], 4);
        f.player.start("a.fseq", 0, 0).unwrap();
        f.player.poll(0);

        f.player.blank();
        assert!(f.player.output().is_blank());
        assert!(f.player.is_playing());

        f.player.poll(60);
        assert!(!f.player.output().is_blank());
        f.player.stop();
        assert!(f.player.is_idle());
        assert!(f.player.output().is_blank());
        assert!(f.player.session().is_none());
    }
}
