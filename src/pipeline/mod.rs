//! Narration pipeline: one trigger in, one spoken description out.
//!
//! # Architecture
//!
//! ```text
//! POST /api/trigger ─┐
//!                    ├─▶ Orchestrator ── SingleFlight (at most one run)
//! voice listener  ───┘        │
//!                             ├─ FrameStore::read + freeze        → Capturing
//!                             ├─ InferenceBoundary::submit         → Inferring
//!                             └─ SpeechSynthesizer + Playback      → Speaking
//!
//! every transition ──▶ EventHub ──▶ SSE subscribers
//! BusyFlag ──────────▶ voice listener (echo suppression)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use narrate::camera::FrameStore;
//! use narrate::events::EventHub;
//! use narrate::inference::{InferenceBoundary, WorkerLauncher};
//! use narrate::pipeline::{Orchestrator, OrchestratorConfig, TriggerSource};
//! use narrate::playback::PlaybackController;
//! use narrate::speech::SpeechSynthesizer;
//!
//! # fn launcher() -> Arc<dyn WorkerLauncher> { unimplemented!() }
//! # fn synthesizer() -> Arc<dyn SpeechSynthesizer> { unimplemented!() }
//! #[tokio::main]
//! async fn main() {
//!     let hub = EventHub::new(64, Duration::from_secs(15), 200);
//!     let orchestrator = Orchestrator::new(
//!         hub.clone(),
//!         Arc::new(FrameStore::new()),
//!         Arc::new(InferenceBoundary::new(launcher(), Duration::from_secs(60))),
//!         synthesizer(),
//!         Arc::new(PlaybackController::new("aplay", vec!["-q".into(), "-".into()])),
//!         OrchestratorConfig::default(),
//!     );
//!
//!     let run = orchestrator.trigger(TriggerSource::Manual).await.unwrap();
//!     println!("{:?}", run.finished().await.result);
//! }
//! ```

pub mod busy;
#[cfg(test)]
pub(crate) mod fakes;
pub mod error;
pub mod lock;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use busy::BusyFlag;
pub use error::{ErrorKind, PipelineError};
pub use lock::{RunGuard, SingleFlight};
pub use runner::{Orchestrator, OrchestratorConfig, RunHandle};
pub use state::{PipelinePhase, PipelineRun, RunResult, TriggerSource};
