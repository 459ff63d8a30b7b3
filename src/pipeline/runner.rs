//! Pipeline orchestrator: drives capture → inference → speech for one run.
//!
//! [`Orchestrator`] owns the single-flight lock and publishes every phase
//! transition on the [`EventHub`].  Each accepted trigger becomes two tokio
//! tasks:
//!
//! ```text
//! trigger / try_trigger
//!   ├─ acquire lock (wait up to lock_timeout / don't wait)
//!   ├─ publish Status(Triggered), Trigger(active)     ← before any side effect
//!   ├─ busy.set()
//!   ├─ spawn ack beep                                 ← independent task
//!   ├─ spawn run task:   Capturing ─▶ Inferring ─▶ Speaking
//!   └─ spawn supervisor: await run task (catches panics)
//!                          ├─ Err ─▶ publish Error
//!                          └─ publish Status(Idle), Trigger(inactive),
//!                             busy.clear(), release lock
//! ```
//!
//! Failures never escape a run: every exit path goes through the supervisor,
//! which reports and returns the pipeline to `Idle`.  Nothing is retried.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::camera::FrameStore;
use crate::config::AppConfig;
use crate::events::{Event, EventHub, LogLevel};
use crate::inference::InferenceBoundary;
use crate::listener::TriggerSink;
use crate::playback::{PlaybackController, PlaybackOutcome};
use crate::speech::{ack_tone, SpeechSynthesizer};

use super::busy::BusyFlag;
use super::error::PipelineError;
use super::lock::{RunGuard, SingleFlight};
use super::state::{PipelinePhase, PipelineRun, RunResult, TriggerSource};

// ---------------------------------------------------------------------------
// OrchestratorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How long `trigger` waits for a running pipeline.
    pub lock_timeout: Duration,
    /// How long the captured frame stays on the video feed.
    pub freeze: Duration,
    /// Play a beep when a trigger is accepted.
    pub ack_beep: bool,
}

impl OrchestratorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            lock_timeout: config.inference.lock_timeout(),
            freeze: config.camera.freeze(),
            ack_beep: config.speech.ack_beep,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// RunHandle
// ---------------------------------------------------------------------------

/// Handle to a run that has been started.  Dropping it does not cancel the
/// run.
#[derive(Debug)]
pub struct RunHandle {
    id: u64,
    source: TriggerSource,
    join: JoinHandle<PipelineRun>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the run to return to `Idle` and get its record.
    pub async fn finished(self) -> PipelineRun {
        match self.join.await {
            Ok(run) => run,
            Err(e) => {
                log::error!("pipeline: supervisor for run {} died: {e}", self.id);
                let mut run = PipelineRun::new(self.id, self.source);
                run.result = RunResult::Error(super::ErrorKind::Internal);
                run
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

enum Job {
    /// The full capture → describe → speak sequence.
    Narrate,
    /// Speak the given text only.
    Speak(String),
}

struct Inner {
    hub: EventHub,
    frames: Arc<FrameStore>,
    inference: Arc<InferenceBoundary>,
    speech: Arc<dyn SpeechSynthesizer>,
    playback: Arc<PlaybackController>,
    lock: SingleFlight,
    busy: BusyFlag,
    /// The one process-wide current phase.  Status events are published
    /// while holding it, so their order matches the order of changes.
    phase: Mutex<PipelinePhase>,
    /// Set by `stop()` during `Speaking`; the run then skips or ends
    /// playback.
    speech_cancelled: AtomicBool,
    next_run: AtomicU64,
    config: OrchestratorConfig,
    runtime: Handle,
}

/// Cheap to clone; all clones drive the same pipeline.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; run tasks are spawned on
    /// the runtime current at construction, so `try_trigger` can be called
    /// from plain threads.
    pub fn new(
        hub: EventHub,
        frames: Arc<FrameStore>,
        inference: Arc<InferenceBoundary>,
        speech: Arc<dyn SpeechSynthesizer>,
        playback: Arc<PlaybackController>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                hub,
                frames,
                inference,
                speech,
                playback,
                lock: SingleFlight::new(),
                busy: BusyFlag::new(),
                phase: Mutex::new(PipelinePhase::Idle),
                speech_cancelled: AtomicBool::new(false),
                next_run: AtomicU64::new(0),
                config,
                runtime: Handle::current(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Start a run, waiting up to the lock timeout for a running one to end.
    pub async fn trigger(&self, source: TriggerSource) -> Result<RunHandle, PipelineError> {
        match self.inner.lock.acquire(self.inner.config.lock_timeout).await {
            Ok(guard) => Ok(self.launch(guard, source, Job::Narrate)),
            Err(e) => {
                self.inner
                    .hub
                    .log(LogLevel::Warn, "pipeline: busy, trigger rejected");
                Err(e)
            }
        }
    }

    /// Start a run only if none is active.  Never waits.
    pub fn try_trigger(&self, source: TriggerSource) -> Result<RunHandle, PipelineError> {
        let guard = self.inner.lock.try_acquire()?;
        Ok(self.launch(guard, source, Job::Narrate))
    }

    /// Speak `text` without capturing or describing, under the same lock.
    pub async fn speak(&self, text: &str) -> Result<RunHandle, PipelineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::Engine("nothing to say".into()));
        }
        let guard = self
            .inner
            .lock
            .acquire(self.inner.config.lock_timeout)
            .await?;
        Ok(self.launch(guard, TriggerSource::Manual, Job::Speak(text.to_string())))
    }

    /// Stop speech output.  Idempotent.
    ///
    /// When a run is speaking, `Status(Idle)` is published right away rather
    /// than after the player process has been reaped.  Returns whether a
    /// player was running.
    pub fn stop(&self) -> bool {
        let was_playing = self.inner.playback.stop();

        let mut phase = self.inner.phase.lock().unwrap();
        if *phase == PipelinePhase::Speaking {
            self.inner.speech_cancelled.store(true, Ordering::SeqCst);
            *phase = PipelinePhase::Idle;
            self.inner.hub.publish(Event::status(PipelinePhase::Idle));
        }
        drop(phase);

        if was_playing {
            log::info!("pipeline: playback stopped on request");
        }
        was_playing
    }

    pub fn phase(&self) -> PipelinePhase {
        *self.inner.phase.lock().unwrap()
    }

    /// Whether a run holds the lock.
    pub fn is_running(&self) -> bool {
        self.inner.lock.is_held()
    }

    /// The flag the voice listener uses for echo suppression.
    pub fn busy_flag(&self) -> BusyFlag {
        self.inner.busy.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.playback.is_playing()
    }

    // -----------------------------------------------------------------------
    // Run lifecycle
    // -----------------------------------------------------------------------

    fn launch(&self, guard: RunGuard, source: TriggerSource, job: Job) -> RunHandle {
        let inner = &self.inner;
        let id = inner.next_run.fetch_add(1, Ordering::Relaxed) + 1;
        let mut run = PipelineRun::new(id, source);
        inner.speech_cancelled.store(false, Ordering::SeqCst);

        self.advance(&mut run, PipelinePhase::Triggered);
        inner.hub.publish(Event::Trigger {
            active: true,
            source,
        });
        inner.busy.set();
        log::info!("pipeline: run {id} started ({source:?})");

        let beep = (inner.config.ack_beep && matches!(job, Job::Narrate)).then(|| {
            let playback = Arc::clone(&inner.playback);
            inner.runtime.spawn(async move {
                match ack_tone() {
                    Ok(wav) => {
                        if let Err(e) = playback.play(wav) {
                            log::debug!("pipeline: ack beep failed: {e}");
                        }
                    }
                    Err(e) => log::debug!("pipeline: ack beep failed: {e}"),
                }
            })
        });

        let record = run.clone();
        let this = self.clone();
        let task = inner.runtime.spawn(async move {
            let result = match job {
                Job::Narrate => this.narrate(&mut run, beep).await,
                Job::Speak(text) => this.speak_text(&mut run, &text).await.map(|()| text),
            };
            (run, result)
        });

        let this = self.clone();
        let join = inner.runtime.spawn(async move {
            let run = match task.await {
                Ok((mut run, Ok(text))) => {
                    run.result = RunResult::Text(text);
                    run
                }
                Ok((mut run, Err(e))) => {
                    this.report(run.id, &e);
                    run.result = RunResult::Error(e.kind());
                    run
                }
                Err(join_err) => {
                    let e = PipelineError::Internal(format!("run task failed: {join_err}"));
                    this.report(record.id, &e);
                    let mut run = record;
                    run.result = RunResult::Error(e.kind());
                    run
                }
            };
            this.finish(&run);
            drop(guard);
            run
        });

        RunHandle { id, source, join }
    }

    async fn narrate(
        &self,
        run: &mut PipelineRun,
        beep: Option<JoinHandle<()>>,
    ) -> Result<String, PipelineError> {
        let inner = &self.inner;

        self.advance(run, PipelinePhase::Capturing);
        let snapshot = inner.frames.read().ok_or(PipelineError::NoFrame)?;
        inner.frames.freeze(Arc::clone(&snapshot), inner.config.freeze);
        inner.hub.publish(Event::CapturedImage {
            seq: snapshot.seq,
            jpeg: Arc::clone(&snapshot.encoded),
        });

        self.advance(run, PipelinePhase::Inferring);
        let text = inner.inference.submit(&snapshot.decoded).await?;
        log::info!("pipeline: run {} described: {text:?}", run.id);
        inner.hub.publish(Event::Text { text: text.clone() });

        // The beep's play() must have landed so that ours pre-empts it, not
        // the other way round.
        if let Some(beep) = beep {
            let _ = beep.await;
        }
        self.speak_text(run, &text).await?;
        Ok(text)
    }

    /// Speak `text`.  A stop request ends this as success: the
    /// `PlaybackInterrupted` it produces is swallowed here.
    async fn speak_text(&self, run: &mut PipelineRun, text: &str) -> Result<(), PipelineError> {
        match self.synthesize_and_play(run, text).await {
            Err(PipelineError::PlaybackInterrupted) => {
                log::info!("pipeline: run {} playback interrupted", run.id);
                Ok(())
            }
            other => other,
        }
    }

    async fn synthesize_and_play(
        &self,
        run: &mut PipelineRun,
        text: &str,
    ) -> Result<(), PipelineError> {
        let inner = &self.inner;
        self.advance(run, PipelinePhase::Speaking);

        let speech = Arc::clone(&inner.speech);
        let owned = text.to_string();
        let synthesized = tokio::task::spawn_blocking(move || speech.synthesize(&owned))
            .await
            .map_err(|e| PipelineError::Internal(format!("synthesis task failed: {e}")))?;

        // A stopped run has already gone Idle; whatever synthesis produced,
        // including a failure, no longer matters.
        if self.speech_cancelled() {
            return Err(PipelineError::PlaybackInterrupted);
        }
        let playback = inner.playback.play(synthesized?)?;
        // stop() may have landed between the check above and play().
        if self.speech_cancelled() {
            inner.playback.stop();
        }

        match playback.finished().await {
            PlaybackOutcome::Completed => Ok(()),
            PlaybackOutcome::Interrupted => Err(PipelineError::PlaybackInterrupted),
            PlaybackOutcome::Failed(msg) => Err(PipelineError::Engine(format!(
                "playback failed: {msg}"
            ))),
        }
    }

    fn advance(&self, run: &mut PipelineRun, phase: PipelinePhase) {
        run.advance(phase);
        let mut current = self.inner.phase.lock().unwrap();
        *current = phase;
        self.inner.hub.publish(Event::status(phase));
    }

    fn speech_cancelled(&self) -> bool {
        self.inner.speech_cancelled.load(Ordering::SeqCst)
    }

    /// Publish a run failure.  Holds the phase lock so the error cannot land
    /// after a stop() that already idled the run; in that case only the log
    /// records it.
    fn report(&self, run_id: u64, e: &PipelineError) {
        let inner = &self.inner;
        {
            let phase = inner.phase.lock().unwrap();
            let stopped = *phase == PipelinePhase::Idle && self.speech_cancelled();
            if !stopped {
                inner.hub.publish(Event::error(e.kind(), e.to_string()));
            }
        }
        inner
            .hub
            .log(LogLevel::Error, format!("pipeline: run {run_id} failed: {e}"));
    }

    fn finish(&self, run: &PipelineRun) {
        let inner = &self.inner;
        {
            let mut phase = inner.phase.lock().unwrap();
            if *phase != PipelinePhase::Idle {
                *phase = PipelinePhase::Idle;
                inner.hub.publish(Event::status(PipelinePhase::Idle));
            }
            inner.hub.publish(Event::Trigger {
                active: false,
                source: run.source,
            });
        }
        inner.busy.clear();
        log::info!(
            "pipeline: run {} finished in {:?} ({:?})",
            run.id,
            run.elapsed(),
            run.result
        );
    }
}

impl TriggerSink for Orchestrator {
    fn fire(&self) -> Result<(), PipelineError> {
        self.try_trigger(TriggerSource::Voice).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Delivery, Subscription};
    use crate::pipeline::fakes::{orchestrator, orchestrator_with, publish_frame, SlowFailingSpeech};
    use crate::pipeline::ErrorKind;

    async fn statuses_until_inactive(sub: &mut Subscription) -> Vec<Event> {
        let mut seen = Vec::new();
        while let Some(Delivery::Event(event)) = sub.next().await {
            let done = matches!(&*event, Event::Trigger { active: false, .. });
            seen.push((*event).clone());
            if done {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn successful_run_publishes_phases_in_order() {
        let (orch, hub, frames) = orchestrator(PlaybackController::new("cat", vec![]));
        publish_frame(&frames);
        let mut sub = hub.subscribe();

        let run = orch.trigger(TriggerSource::Manual).await.unwrap().finished().await;
        assert_eq!(run.result, RunResult::Text("a quiet street".into()));
        assert_eq!(run.phase, PipelinePhase::Speaking);

        let phases: Vec<_> = statuses_until_inactive(&mut sub)
            .await
            .into_iter()
            .filter_map(|e| match e {
                Event::Status { phase } => Some(phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                PipelinePhase::Triggered,
                PipelinePhase::Capturing,
                PipelinePhase::Inferring,
                PipelinePhase::Speaking,
                PipelinePhase::Idle,
            ]
        );
        assert_eq!(orch.phase(), PipelinePhase::Idle);
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn missing_frame_fails_then_recovers() {
        let (orch, hub, frames) = orchestrator(PlaybackController::new("cat", vec![]));
        let mut sub = hub.subscribe();

        let run = orch.trigger(TriggerSource::Manual).await.unwrap().finished().await;
        assert_eq!(run.error(), Some(ErrorKind::NoFrame));

        let events = statuses_until_inactive(&mut sub).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Error { kind: ErrorKind::NoFrame, .. })));
        assert!(!orch.busy_flag().is_set());

        publish_frame(&frames);
        let run = orch.trigger(TriggerSource::Manual).await.unwrap().finished().await;
        assert!(run.is_success());
    }

    #[tokio::test]
    async fn second_trigger_is_busy_while_running() {
        let (orch, _hub, frames) =
            orchestrator(PlaybackController::new("sleep", vec!["5".into()]));
        publish_frame(&frames);

        let first = orch.try_trigger(TriggerSource::Voice).unwrap();
        assert!(matches!(
            orch.try_trigger(TriggerSource::Voice),
            Err(PipelineError::Busy)
        ));
        assert!(matches!(
            orch.trigger(TriggerSource::Manual).await,
            Err(PipelineError::Busy)
        ));

        // Let it reach playback, then stop it.
        for _ in 0..200 {
            if orch.is_playing() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(orch.stop());
        let run = first.finished().await;
        assert!(run.is_success());
    }

    #[tokio::test]
    async fn stop_publishes_idle_immediately() {
        let (orch, hub, frames) =
            orchestrator(PlaybackController::new("sleep", vec!["5".into()]));
        publish_frame(&frames);

        let handle = orch.trigger(TriggerSource::Manual).await.unwrap();
        for _ in 0..200 {
            if orch.is_playing() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let mut sub = hub.subscribe();
        orch.stop();
        assert_eq!(orch.phase(), PipelinePhase::Idle);

        match sub.next().await {
            Some(Delivery::Event(e)) => {
                assert_eq!(*e, Event::status(PipelinePhase::Idle))
            }
            other => panic!("unexpected {other:?}"),
        }
        handle.finished().await;
        assert!(!orch.stop());
    }

    #[tokio::test]
    async fn speak_only_run_skips_capture() {
        let (orch, hub, _frames) = orchestrator(PlaybackController::new("cat", vec![]));
        let mut sub = hub.subscribe();

        let run = orch.speak("hello there").await.unwrap().finished().await;
        assert_eq!(run.result, RunResult::Text("hello there".into()));

        let phases: Vec<_> = statuses_until_inactive(&mut sub)
            .await
            .into_iter()
            .filter_map(|e| match e {
                Event::Status { phase } => Some(phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                PipelinePhase::Triggered,
                PipelinePhase::Speaking,
                PipelinePhase::Idle
            ]
        );

        assert!(orch.speak("   ").await.is_err());
    }

    #[tokio::test]
    async fn playback_failure_is_an_engine_error() {
        let (orch, _hub, frames) = orchestrator(PlaybackController::new("false", vec![]));
        publish_frame(&frames);
        let run = orch.trigger(TriggerSource::Manual).await.unwrap().finished().await;
        assert_eq!(run.error(), Some(ErrorKind::EngineError));
    }

    #[tokio::test]
    async fn busy_flag_spans_the_run() {
        let (orch, _hub, frames) = orchestrator(PlaybackController::new("cat", vec![]));
        publish_frame(&frames);
        let busy = orch.busy_flag();

        let handle = orch.try_trigger(TriggerSource::Voice).unwrap();
        assert!(busy.is_set());
        handle.finished().await;
        assert!(!busy.is_set());
        assert_eq!(busy.epoch(), 1);
    }

    #[tokio::test]
    async fn stop_during_failing_synthesis_is_not_reported() {
        let (orch, hub, frames) = orchestrator_with(
            PlaybackController::new("cat", vec![]),
            Arc::new(SlowFailingSpeech(Duration::from_millis(300))),
            false,
        );
        publish_frame(&frames);
        let mut sub = hub.subscribe();

        let handle = orch.trigger(TriggerSource::Manual).await.unwrap();
        for _ in 0..200 {
            if orch.phase() == PipelinePhase::Speaking {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(orch.phase(), PipelinePhase::Speaking);
        orch.stop();

        let run = handle.finished().await;
        assert!(run.is_success(), "stopped run recorded as {:?}", run.result);

        let events = statuses_until_inactive(&mut sub).await;
        let idle_at = events
            .iter()
            .position(|e| *e == Event::status(PipelinePhase::Idle))
            .unwrap();
        assert!(!events[idle_at..]
            .iter()
            .any(|e| matches!(e, Event::Error { .. })));
        assert_eq!(
            events.iter().filter(|e| **e == Event::status(PipelinePhase::Idle)).count(),
            1
        );
    }

    #[tokio::test]
    async fn failing_synthesis_without_stop_is_reported_before_idle() {
        let (orch, hub, frames) = orchestrator_with(
            PlaybackController::new("cat", vec![]),
            Arc::new(SlowFailingSpeech(Duration::ZERO)),
            false,
        );
        publish_frame(&frames);
        let mut sub = hub.subscribe();

        let run = orch.trigger(TriggerSource::Manual).await.unwrap().finished().await;
        assert_eq!(run.error(), Some(ErrorKind::EngineError));

        let events = statuses_until_inactive(&mut sub).await;
        let error_at = events
            .iter()
            .position(|e| matches!(e, Event::Error { .. }))
            .unwrap();
        let idle_at = events
            .iter()
            .position(|e| *e == Event::status(PipelinePhase::Idle))
            .unwrap();
        assert!(error_at < idle_at);
    }

    #[tokio::test]
    async fn ack_beep_never_cuts_off_the_narration() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("played");
        // Each player appends the byte count it received; a killed player
        // appends nothing.
        let player = PlaybackController::new(
            "sh",
            vec!["-c".into(), format!("wc -c >> '{}'", log.display())],
        );
        let (orch, _hub, frames) =
            orchestrator_with(player, Arc::new(crate::pipeline::fakes::EchoSpeech), true);
        publish_frame(&frames);

        for _ in 0..5 {
            let run = orch.trigger(TriggerSource::Manual).await.unwrap().finished().await;
            assert!(run.is_success());
        }

        let played = std::fs::read_to_string(&log).unwrap();
        let narrations = played
            .lines()
            .filter(|line| line.trim() == "a quiet street".len().to_string())
            .count();
        assert_eq!(narrations, 5, "player log:\n{played}");
    }
}
