//! Local autoplay: loops one configured sequence forever whenever no
//! remote session is driving the player

use crate::constants::REMOTE_PLAY_SENTINEL;

use super::player::{PollOutcome, SequencePlayer, StartOutcome};

/// Keeps the configured sequence playing while the player would otherwise
/// sit idle
#[derive(Debug, Clone)]
pub struct AutoplayFallbackController {
    file_name: String,
    /// Set when the file proved unplayable; cleared by reconfiguration
    halted: bool,
}

impl AutoplayFallbackController {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            halted: false,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// No local file is configured, or the sentinel hands control to a leader
    pub fn defers_to_remote(&self) -> bool {
        self.file_name.is_empty() || self.file_name == REMOTE_PLAY_SENTINEL
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Replace the configured file. Returns whether the name changed.
    pub fn set_file_name(&mut self, file_name: impl Into<String>) -> bool {
        let file_name = file_name.into();
        if file_name == self.file_name {
            return false;
        }
        self.file_name = file_name;
        self.halted = false;
        true
    }

    /// Run after each player poll with that poll's outcome
    pub fn tick(
        &mut self,
        player: &mut SequencePlayer,
        outcome: PollOutcome,
        remote_active: bool,
        now: u64,
    ) {
        if remote_active || self.defers_to_remote() {
            return;
        }

        if outcome == PollOutcome::Failed && player.playing_name().is_none() {
            tracing::warn!("Autoplay of '{}' halted after a read failure", self.file_name);
            self.halted = true;
        }

        if self.halted || player.is_playing() {
            return;
        }

        match player.start(&self.file_name, 0, now) {
            Ok(StartOutcome::Started) => {
                tracing::debug!("Autoplay (re)started '{}'", self.file_name);
                // Frame 0 goes out on this tick so a loop boundary never shows blank
                if player.poll(now) == PollOutcome::Failed {
                    tracing::warn!("Autoplay of '{}' halted after a read failure", self.file_name);
                    self.halted = true;
                }
            }
            Ok(StartOutcome::Refused) => {
                tracing::warn!("Autoplay of '{}' halted: file is unplayable", self.file_name);
                self.halted = true;
            }
            Err(e) if e.is_invalid_file() => {
                tracing::warn!("Autoplay of '{}' halted: {}", self.file_name, e);
                self.halted = true;
            }
            Err(e) => {
                tracing::debug!("Autoplay of '{}' will retry: {}", self.file_name, e);
            }
            Ok(StartOutcome::AlreadyPlaying) | Ok(StartOutcome::Ignored) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::player::StopReason;
    use crate::sequence::testing::SequenceBuilder;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn player_with(files: Vec<(&str, Vec<u8>)>) -> SequencePlayer {
        let store = MemoryStore::new();
        for (name, bytes) in files {
            store.insert(name, bytes);
        }
        SequencePlayer::new(Arc::new(store), 4)
    }

    fn tick(auto: &mut AutoplayFallbackController, player: &mut SequencePlayer, now: u64) {
        let outcome = player.poll(now);
        auto.tick(player, outcome, false, now);
    }

    #[test]
    fn test_loops_forever() {
        let mut player = player_with(vec![("idle.fseq", SequenceBuilder::new(4, 4).build())]);
        let mut auto = AutoplayFallbackController::new("idle.fseq");

        tick(&mut auto, &mut player, 0);
        assert_eq!(player.playing_name(), Some("idle.fseq"));

        // Three full passes; the file is restarted on the tick it finishes
        for now in (0..600).step_by(50) {
            tick(&mut auto, &mut player, now);
            assert!(player.is_playing());
        }
        assert_eq!(player.last_stop_reason(), Some(StopReason::EndOfSequence));
        assert!(!auto.is_halted());
    }

    #[test]
    fn test_restarts_after_external_stop() {
        let mut player = player_with(vec![("idle.fseq", SequenceBuilder::new(4, 40).build())]);
        let mut auto = AutoplayFallbackController::new("idle.fseq");
        tick(&mut auto, &mut player, 0);

        player.stop();
        tick(&mut auto, &mut player, 100);
        assert!(player.is_playing());
    }

    #[test]
    fn test_invalid_file_halts() {
        let mut player = player_with(vec![(
            "v1.fseq",
            SequenceBuilder::new(4, 4).version(1, 0).build(),
        )]);
        let mut auto = AutoplayFallbackController::new("v1.fseq");

        tick(&mut auto, &mut player, 0);
        assert!(player.is_idle());
        assert!(auto.is_halted());
        assert_eq!(player.sticky_failure(), Some("v1.fseq"));

        tick(&mut auto, &mut player, 50);
        assert!(player.is_idle());
    }

    #[test]
    fn test_short_read_halts() {
        let bytes = SequenceBuilder::new(4, 3).build();
        let cut = bytes.len() - 2;
        let mut player = player_with(vec![("cut.fseq", bytes[..cut].to_vec())]);
        let mut auto = AutoplayFallbackController::new("cut.fseq");

        for now in (0..200).step_by(50) {
            tick(&mut auto, &mut player, now);
        }
        assert!(auto.is_halted());
        assert!(player.is_idle());
        assert!(player.output().is_blank());

        // A new name lifts the halt
        assert!(auto.set_file_name("other.fseq"));
        assert!(!auto.is_halted());
        assert!(!auto.set_file_name("other.fseq"));
    }

    #[test]
    fn test_loop_boundary_never_blank() {
        let mut player = player_with(vec![("idle.fseq", SequenceBuilder::new(4, 2).build())]);
        let mut auto = AutoplayFallbackController::new("idle.fseq");

        for now in (0..400).step_by(5) {
            tick(&mut auto, &mut player, now);
            assert!(player.is_playing());
            assert!(!player.output().is_blank(), "blank output at {}ms", now);
        }
        assert_eq!(player.session().unwrap().current_frame(), Some(1));
    }

    #[test]
    fn test_missing_storage_is_retried() {
        let store = Arc::new(MemoryStore::unavailable());
        store.insert("idle.fseq", SequenceBuilder::new(4, 4).build());
        let mut player = SequencePlayer::new(store.clone(), 4);
        let mut auto = AutoplayFallbackController::new("idle.fseq");

        tick(&mut auto, &mut player, 0);
        tick(&mut auto, &mut player, 50);
        assert!(player.is_idle());
        assert!(!auto.is_halted());
        assert_eq!(player.sticky_failure(), None);

        store.set_available(true);
        tick(&mut auto, &mut player, 100);
        assert_eq!(player.playing_name(), Some("idle.fseq"));
        assert!(!player.output().is_blank());
    }

    #[test]
    fn test_inactive_when_remote_or_sentinel() {
        let mut player = player_with(vec![("idle.fseq", SequenceBuilder::new(4, 4).build())]);

        let mut auto = AutoplayFallbackController::new("idle.fseq");
        auto.tick(&mut player, PollOutcome::Idle, true, 0);
        assert!(player.is_idle());

        let mut sentinel = AutoplayFallbackController::new("...");
        assert!(sentinel.defers_to_remote());
        sentinel.tick(&mut player, PollOutcome::Idle, false, 0);
        assert!(player.is_idle());
    }
}
