//! Always-on voice trigger on a dedicated OS thread.
//!
//! ```text
//! cpal callback ──AudioChunk──▶ voice-listener thread
//!                                 ├─ EchoGate        (drop while busy)
//!                                 ├─ StreamResampler  (mono, 16 kHz)
//!                                 ├─ SpeechRecognizer (partial / final)
//!                                 ├─ TriggerDetector  (phrase + cooldown)
//!                                 └─ TriggerSink::fire  ──▶ Orchestrator::try_trigger
//! ```
//!
//! The cpal stream is `!Send`, so the model, the device and the stream are all
//! opened on the listener thread itself.  If any of them is missing the
//! failure is reported on the event hub and the thread exits; the rest of
//! the service keeps running without voice triggers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use super::detector::TriggerDetector;
use super::gate::EchoGate;
use super::recognizer::{Recognition, RecognizerError, SpeechRecognizer, WindowedRecognizer};
use crate::audio::{AudioCapture, AudioChunk, ChunkSender, StreamResampler};
use crate::config::{AppPaths, ListenerConfig};
use crate::events::{Event, EventHub, LogLevel};
use crate::pipeline::{BusyFlag, PipelineError};

/// Where a detected trigger goes.
pub trait TriggerSink: Send + Sync {
    /// Start a run without waiting.  `Err(Busy)` when one is already active.
    fn fire(&self) -> Result<(), PipelineError>;
}

// ---------------------------------------------------------------------------
// ListenerLoop
// ---------------------------------------------------------------------------

/// The per-chunk logic of the listener, independent of threads and devices.
pub struct ListenerLoop {
    recognizer: Box<dyn SpeechRecognizer>,
    resampler: Option<StreamResampler>,
    gate: EchoGate,
    detector: TriggerDetector,
    sink: Arc<dyn TriggerSink>,
}

impl ListenerLoop {
    pub fn new(
        recognizer: Box<dyn SpeechRecognizer>,
        busy: BusyFlag,
        detector: TriggerDetector,
        sink: Arc<dyn TriggerSink>,
    ) -> Self {
        Self {
            recognizer,
            resampler: None,
            gate: EchoGate::new(busy),
            detector,
            sink,
        }
    }

    /// Feed one captured chunk.  Returns `true` when it started a run.
    pub fn process(&mut self, chunk: &AudioChunk) -> bool {
        if !self.gate.admit(chunk.captured_at, self.recognizer.as_mut()) {
            // Dropped audio breaks continuity.
            if let Some(resampler) = self.resampler.as_mut() {
                resampler.reset();
            }
            return false;
        }
        let samples = self.resample(chunk);

        let text = match self.recognizer.accept(&samples) {
            Recognition::Nothing => return false,
            Recognition::Partial(text) => {
                log::debug!("listener: partial {text:?}");
                text
            }
            Recognition::Final(text) => {
                log::info!("listener: heard {text:?}");
                text
            }
        };

        if !self.detector.check(&text, Instant::now()) {
            return false;
        }
        log::info!("listener: trigger phrase {:?} detected", self.detector.phrase());
        self.recognizer.reset();
        self.resampler = None;

        match self.sink.fire() {
            Ok(()) => true,
            Err(PipelineError::Busy) => {
                log::info!("listener: pipeline busy, voice trigger ignored");
                false
            }
            Err(e) => {
                log::warn!("listener: voice trigger failed: {e}");
                false
            }
        }
    }

    fn resample(&mut self, chunk: &AudioChunk) -> Vec<f32> {
        let (rate, channels) = (chunk.sample_rate.max(1), chunk.channels);
        if !matches!(&self.resampler, Some(r) if r.matches(rate, channels)) {
            log::debug!(
                "listener: input is {rate} Hz x{channels} ({:.0} ms chunks)",
                chunk.duration_secs() * 1000.0
            );
            self.resampler = None;
        }
        self.resampler
            .get_or_insert_with(|| StreamResampler::new(rate, channels))
            .process(&chunk.samples)
    }
}

// ---------------------------------------------------------------------------
// VoiceListener
// ---------------------------------------------------------------------------

/// Handle to the listener thread.  Dropping it stops the thread within one
/// poll interval.
pub struct VoiceListener {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    _thread: std::thread::JoinHandle<()>,
}

const POLL: Duration = Duration::from_millis(200);

/// Chunks queued between the audio callback and the recognizer, about a
/// second at typical 10 ms callbacks.  Whisper can run slower than real
/// time, and audio older than this is not worth recognizing.
const BACKLOG_CHUNKS: usize = 100;

impl VoiceListener {
    /// # Panics
    ///
    /// Panics if the OS refuses to create the thread.
    pub fn spawn(
        config: ListenerConfig,
        paths: AppPaths,
        busy: BusyFlag,
        sink: Arc<dyn TriggerSink>,
        hub: EventHub,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let stop_flag = Arc::clone(&stop);
        let running_flag = Arc::clone(&running);

        let thread = std::thread::Builder::new()
            .name("voice-listener".into())
            .spawn(move || {
                if let Err(e) = listen(&config, &paths, busy, sink, &stop_flag) {
                    let detail = match e {
                        RecognizerError::Unavailable(msg) => msg,
                        other => other.to_string(),
                    };
                    let e = PipelineError::RecognizerUnavailable(detail);
                    hub.log(LogLevel::Error, format!("listener: {e}; voice trigger disabled"));
                    hub.publish(Event::error(e.kind(), e.to_string()));
                }
                running_flag.store(false, Ordering::SeqCst);
            })
            .expect("failed to spawn voice-listener thread");

        Self {
            stop,
            running,
            _thread: thread,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for VoiceListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn listen(
    config: &ListenerConfig,
    paths: &AppPaths,
    busy: BusyFlag,
    sink: Arc<dyn TriggerSink>,
    stop: &AtomicBool,
) -> Result<(), RecognizerError> {
    let recognizer = WindowedRecognizer::load(config, paths)?;
    let capture = AudioCapture::open(config.input_device.as_deref())?;
    let (tx, rx) = ChunkSender::bounded(BACKLOG_CHUNKS);
    let stream = capture.start(tx)?;

    log::info!(
        "listener: listening on {:?} for {:?}",
        capture.device_name(),
        config.trigger_phrase
    );

    let detector = TriggerDetector::new(&config.trigger_phrase, config.cooldown());
    let mut looped = ListenerLoop::new(Box::new(recognizer), busy, detector, sink);

    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(POLL) {
            Ok(chunk) => {
                looped.process(&chunk);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(RecognizerError::Unavailable("audio stream ended".into()));
            }
        }
    }
    log::info!("listener: stopped ({} chunks dropped)", stream.dropped());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
