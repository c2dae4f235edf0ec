use std::io::Write;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Playback blocked by the platform")]
    Blocked,
}

/// Something that can play the new-message sound.
pub trait SoundPlayer: Send + Sync {
    fn play(&self) -> Result<(), NotificationError>;
}

/// Rings the terminal bell on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn play(&self) -> Result<(), NotificationError> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(b"\x07")
            .and_then(|_| stdout.flush())
            .map_err(|e| NotificationError::Playback(e.to_string()))
    }
}

/// Plays the notification sound and swallows playback failures.
#[derive(Clone)]
pub struct Notifier {
    player: Arc<dyn SoundPlayer>,
}

impl Notifier {
    pub fn new(player: Arc<dyn SoundPlayer>) -> Self {
        Self { player }
    }

    /// Returns whether the sound actually played.
    pub fn notify(&self) -> bool {
        match self.player.play() {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(
                    target: "backoffice_chat::notifications",
                    "Ignoring notification sound failure: {}",
                    e
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how many times it was asked to play.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingPlayer {
        plays: AtomicUsize,
    }

    impl RecordingPlayer {
        pub(crate) fn plays(&self) -> usize {
            self.plays.load(Ordering::SeqCst)
        }
    }

    impl SoundPlayer for RecordingPlayer {
        fn play(&self) -> Result<(), NotificationError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Always refuses, like a browser blocking autoplay.
    #[derive(Debug, Default)]
    pub(crate) struct BlockedPlayer {
        attempts: AtomicUsize,
    }

    impl BlockedPlayer {
        pub(crate) fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl SoundPlayer for BlockedPlayer {
        fn play(&self) -> Result<(), NotificationError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NotificationError::Blocked)
        }
    }

    #[test]
    fn test_notifier_reports_successful_playback() {
        let player = Arc::new(RecordingPlayer::default());
        let notifier = Notifier::new(player.clone());
        assert!(notifier.notify());
        assert!(notifier.notify());
        assert_eq!(player.plays(), 2);
    }

    #[test]
    fn test_notifier_swallows_playback_failure() {
        let player = Arc::new(BlockedPlayer::default());
        let notifier = Notifier::new(player.clone());
        assert!(!notifier.notify());
        assert_eq!(player.attempts(), 1);
    }
}
