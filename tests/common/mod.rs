//! Shared fakes for the end-to-end tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use narrate::camera::{DecodedFrame, FrameStore};
use narrate::events::{Delivery, Event, EventHub, Subscription};
use narrate::inference::{InferenceBoundary, InferenceError, InferenceWorker, WorkerLauncher};
use narrate::pipeline::{Orchestrator, OrchestratorConfig, PipelinePhase};
use narrate::playback::PlaybackController;
use narrate::speech::{SpeechError, SpeechSynthesizer};

/// What one launched worker does.
#[derive(Debug, Clone, Copy)]
pub enum Worker {
    Answer(&'static str),
    Hang,
}

struct FakeWorker(Worker);

#[async_trait]
impl InferenceWorker for FakeWorker {
    async fn describe(&mut self, _frame: &DecodedFrame) -> Result<String, InferenceError> {
        match self.0 {
            Worker::Answer(text) => Ok(text.to_string()),
            Worker::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }

    async fn terminate(&mut self) {}
}

/// Launches workers following a script; answers "a quiet street" once the
/// script runs out.  `None` in the script is a failed launch.
pub struct ScriptedLauncher {
    script: Mutex<Vec<Option<Worker>>>,
    pub launches: AtomicUsize,
}

impl ScriptedLauncher {
    pub fn new(script: Vec<Option<Worker>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            launches: AtomicUsize::new(0),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn InferenceWorker>, InferenceError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Some(Worker::Answer("a quiet street"))
            } else {
                script.remove(0)
            }
        };
        match next {
            Some(worker) => Ok(Box::new(FakeWorker(worker))),
            None => Err(InferenceError::DeviceUnavailable("no accelerator".into())),
        }
    }
}

pub struct EchoSpeech;

impl SpeechSynthesizer for EchoSpeech {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        Ok(text.as_bytes().to_vec())
    }
}

pub struct Rig {
    pub orchestrator: Orchestrator,
    pub hub: EventHub,
    pub frames: Arc<FrameStore>,
    pub launcher: Arc<ScriptedLauncher>,
}

pub struct RigOptions {
    pub player: PlaybackController,
    pub script: Vec<Option<Worker>>,
    pub inference_timeout: Duration,
    pub hub_capacity: usize,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            player: PlaybackController::new("cat", vec![]),
            script: vec![],
            inference_timeout: Duration::from_secs(5),
            hub_capacity: 64,
        }
    }
}

pub fn rig(options: RigOptions) -> Rig {
    let hub = EventHub::new(options.hub_capacity, Duration::from_secs(15), 50);
    let frames = Arc::new(FrameStore::new());
    let launcher = ScriptedLauncher::new(options.script);
    let inference = Arc::new(InferenceBoundary::new(
        launcher.clone(),
        options.inference_timeout,
    ));
    let orchestrator = Orchestrator::new(
        hub.clone(),
        Arc::clone(&frames),
        inference,
        Arc::new(EchoSpeech),
        Arc::new(options.player),
        OrchestratorConfig {
            lock_timeout: Duration::from_millis(100),
            freeze: Duration::from_millis(10),
            ack_beep: false,
        },
    );
    Rig {
        orchestrator,
        hub,
        frames,
        launcher,
    }
}

pub fn publish_frame(frames: &FrameStore) -> u64 {
    frames.publish(
        DecodedFrame::new(2, 1, vec![10, 20, 30, 40, 50, 60]).unwrap(),
        vec![0xFF, 0xD8, 0xFF, 0xD9],
    )
}

/// Collect events up to and including the next inactive trigger.
pub async fn collect_run(sub: &mut Subscription) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), sub.next())
            .await
            .expect("run did not finish");
        match next {
            Some(Delivery::Event(event)) => {
                let done = matches!(*event, Event::Trigger { active: false, .. });
                events.push((*event).clone());
                if done {
                    return events;
                }
            }
            Some(Delivery::KeepAlive) => {}
            None => panic!("subscription closed"),
        }
    }
}

pub fn phases(events: &[Event]) -> Vec<PipelinePhase> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Status { phase } => Some(*phase),
            _ => None,
        })
        .collect()
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}
