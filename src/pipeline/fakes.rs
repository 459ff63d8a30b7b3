//! Test doubles for the orchestrator's collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::runner::{Orchestrator, OrchestratorConfig};
use crate::camera::{DecodedFrame, FrameStore};
use crate::events::EventHub;
use crate::inference::{InferenceBoundary, InferenceError, InferenceWorker, WorkerLauncher};
use crate::playback::PlaybackController;
use crate::speech::{SpeechError, SpeechSynthesizer};

/// Describes every frame with the same text.
pub struct FixedWorker(pub &'static str);

#[async_trait]
impl InferenceWorker for FixedWorker {
    async fn describe(&mut self, _frame: &DecodedFrame) -> Result<String, InferenceError> {
        Ok(self.0.to_string())
    }

    async fn terminate(&mut self) {}
}

pub struct FixedLauncher(pub &'static str);

#[async_trait]
impl WorkerLauncher for FixedLauncher {
    async fn launch(&self) -> Result<Box<dyn InferenceWorker>, InferenceError> {
        Ok(Box::new(FixedWorker(self.0)))
    }
}

/// "Synthesizes" the text as its own bytes.
pub struct EchoSpeech;

impl SpeechSynthesizer for EchoSpeech {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        Ok(text.as_bytes().to_vec())
    }
}

/// Takes a while, then fails.
pub struct SlowFailingSpeech(pub Duration);

impl SpeechSynthesizer for SlowFailingSpeech {
    fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SpeechError> {
        std::thread::sleep(self.0);
        Err(SpeechError::Failed("voice crashed".into()))
    }
}

/// An orchestrator describing every frame as "a quiet street" and playing
/// through `player`.
pub fn orchestrator(player: PlaybackController) -> (Orchestrator, EventHub, Arc<FrameStore>) {
    orchestrator_with(player, Arc::new(EchoSpeech), false)
}

pub fn orchestrator_with(
    player: PlaybackController,
    speech: Arc<dyn SpeechSynthesizer>,
    ack_beep: bool,
) -> (Orchestrator, EventHub, Arc<FrameStore>) {
    let hub = EventHub::new(64, Duration::from_secs(15), 10);
    let frames = Arc::new(FrameStore::new());
    let inference = Arc::new(InferenceBoundary::new(
        Arc::new(FixedLauncher("a quiet street")),
        Duration::from_secs(5),
    ));
    let orch = Orchestrator::new(
        hub.clone(),
        Arc::clone(&frames),
        inference,
        speech,
        Arc::new(player),
        OrchestratorConfig {
            lock_timeout: Duration::from_millis(50),
            freeze: Duration::from_millis(10),
            ack_beep,
        },
    );
    (orch, hub, frames)
}

pub fn publish_frame(frames: &FrameStore) -> u64 {
    frames.publish(
        DecodedFrame::new(1, 1, vec![1, 2, 3]).unwrap(),
        vec![0xFF, 0xD8, 0xFF, 0xD9],
    )
}
