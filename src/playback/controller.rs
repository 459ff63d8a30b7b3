//! Lifecycle of the external audio player.
//!
//! ```text
//! play(wav) ──▶ stop previous ──▶ spawn player ──▶ monitor task
//!                                                   ├─ stdin written, process exits ─▶ Completed / Failed
//!                                                   └─ stop signal ─▶ kill + reap ──▶ Interrupted
//! ```
//!
//! At most one player runs at a time.  The slot for it has its own mutex,
//! independent of the pipeline lock, so [`PlaybackController::stop`] works
//! from any context while a run holds the pipeline.  A stop is an expected
//! outcome and is reported as [`PlaybackOutcome::Interrupted`], never as an
//! error.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

use crate::config::PlaybackConfig;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    #[error("audio player {0:?} not found")]
    PlayerNotFound(String),

    #[error("failed to start audio player: {0}")]
    Spawn(String),
}

/// How a playback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The player consumed all audio and exited cleanly.
    Completed,
    /// [`PlaybackController::stop`] ended it.
    Interrupted,
    /// The player failed on its own.
    Failed(String),
}

/// A started playback.  Awaiting [`Playback::finished`] is optional.
#[derive(Debug)]
pub struct Playback {
    id: u64,
    done: oneshot::Receiver<PlaybackOutcome>,
}

impl Playback {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait until the player exits.
    pub async fn finished(self) -> PlaybackOutcome {
        self.done
            .await
            .unwrap_or_else(|_| PlaybackOutcome::Failed("playback monitor vanished".into()))
    }
}

struct ActivePlayback {
    id: u64,
    stop_tx: oneshot::Sender<()>,
}

// ---------------------------------------------------------------------------
// PlaybackController
// ---------------------------------------------------------------------------

pub struct PlaybackController {
    program: String,
    args: Vec<String>,
    current: Arc<Mutex<Option<ActivePlayback>>>,
    next_id: AtomicU64,
}

impl PlaybackController {
    /// Player that reads a WAV stream from stdin.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// `aplay -D <device> -q -`.
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(
            config.program.clone(),
            vec!["-D".into(), config.device.clone(), "-q".into(), "-".into()],
        )
    }

    /// Start playing `wav`, stopping whatever was playing before.
    ///
    /// Must be called from within a tokio runtime.
    pub fn play(&self, wav: Vec<u8>) -> Result<Playback, PlaybackError> {
        self.stop();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PlaybackError::PlayerNotFound(self.program.clone()),
                _ => PlaybackError::Spawn(e.to_string()),
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        *self.current.lock().unwrap() = Some(ActivePlayback { id, stop_tx });
        log::debug!("playback: #{id} started ({} bytes)", wav.len());

        let slot = Arc::clone(&self.current);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = &mut stop_rx => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    PlaybackOutcome::Interrupted
                }
                outcome = feed_and_wait(&mut child, wav) => outcome,
            };

            {
                let mut current = slot.lock().unwrap();
                if current.as_ref().is_some_and(|a| a.id == id) {
                    *current = None;
                }
            }

            log::debug!("playback: #{id} ended: {outcome:?}");
            let _ = done_tx.send(outcome);
        });

        Ok(Playback { id, done: done_rx })
    }

    /// Signal the current player to terminate.  Returns whether anything was
    /// playing; calling it with nothing playing is a no-op.
    pub fn stop(&self) -> bool {
        match self.current.lock().unwrap().take() {
            Some(active) => {
                log::debug!("playback: stopping #{}", active.id);
                let _ = active.stop_tx.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }
}

async fn feed_and_wait(child: &mut Child, wav: Vec<u8>) -> PlaybackOutcome {
    if let Some(mut stdin) = child.stdin.take() {
        // A player that exits early closes the pipe; its exit status decides
        // the outcome, so write errors are only logged.
        if let Err(e) = stdin.write_all(&wav).await {
            log::debug!("playback: player closed stdin early: {e}");
        }
        drop(stdin);
    }

    match child.wait().await {
        Ok(status) if status.success() => PlaybackOutcome::Completed,
        Ok(status) => PlaybackOutcome::Failed(format!("player exited with {status}")),
        Err(e) => PlaybackOutcome::Failed(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cat() -> PlaybackController {
        PlaybackController::new("cat", vec![])
    }

    fn sleeper() -> PlaybackController {
        PlaybackController::new("sleep", vec!["5".into()])
    }

    #[tokio::test]
    async fn natural_completion() {
        let ctl = cat();
        let playback = ctl.play(vec![1, 2, 3]).unwrap();
        assert_eq!(playback.finished().await, PlaybackOutcome::Completed);
        assert!(!ctl.is_playing());
    }

    #[tokio::test]
    async fn stop_without_playback_is_noop() {
        let ctl = cat();
        assert!(!ctl.stop());
        assert!(!ctl.stop());
    }

    #[tokio::test]
    async fn stop_interrupts_and_is_not_an_error() {
        let ctl = sleeper();
        let playback = ctl.play(vec![]).unwrap();
        assert!(ctl.is_playing());

        assert!(ctl.stop());
        assert!(!ctl.is_playing());
        assert!(!ctl.stop());

        let outcome = tokio::time::timeout(Duration::from_secs(2), playback.finished())
            .await
            .expect("stop should end playback promptly");
        assert_eq!(outcome, PlaybackOutcome::Interrupted);
    }

    #[tokio::test]
    async fn play_replaces_current_playback() {
        let ctl = sleeper();
        let first = ctl.play(vec![]).unwrap();
        let second = ctl.play(vec![]).unwrap();
        assert_ne!(first.id(), second.id());

        assert_eq!(first.finished().await, PlaybackOutcome::Interrupted);
        assert!(ctl.is_playing());
        ctl.stop();
        assert_eq!(second.finished().await, PlaybackOutcome::Interrupted);
    }

    #[tokio::test]
    async fn failing_player_reports_failure() {
        let ctl = PlaybackController::new("false", vec![]);
        let playback = ctl.play(vec![0; 4]).unwrap();
        assert!(matches!(playback.finished().await, PlaybackOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn missing_player() {
        let ctl = PlaybackController::new("/nonexistent/narrate-player", vec![]);
        assert!(matches!(
            ctl.play(vec![]),
            Err(PlaybackError::PlayerNotFound(_))
        ));
    }

    #[test]
    fn aplay_arguments() {
        let ctl = PlaybackController::from_config(&PlaybackConfig::default());
        assert_eq!(ctl.program, "aplay");
        assert_eq!(ctl.args, vec!["-D", "plughw:2,0", "-q", "-"]);
    }
}
