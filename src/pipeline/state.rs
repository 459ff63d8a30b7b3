//! Pipeline phases and the per-run record.
//!
//! [`PipelinePhase`] drives the orchestrator's state machine.  Observers never
//! read it directly; every transition is published as a status event.
//!
//! [`PipelineRun`] is owned by the run task for its whole duration and is
//! handed back to the caller through [`RunHandle`](super::RunHandle) once the
//! run is over.

use std::time::{Duration, Instant};

use serde::Serialize;

use super::error::ErrorKind;

// ---------------------------------------------------------------------------
// PipelinePhase
// ---------------------------------------------------------------------------

/// States of the narration pipeline.
///
/// The state machine transitions are:
///
/// ```text
/// Idle ──trigger──▶ Triggered ──▶ Capturing ──▶ Inferring ──▶ Speaking ──▶ Idle
///                                    │              │             │
///                                    └──── any failure ───────────┴──▶ Idle
/// ```
///
/// Phases are ordered; within one run they only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// Waiting for a trigger.
    #[default]
    Idle,

    /// A trigger was accepted and the pipeline lock is held.
    Triggered,

    /// Reading the latest frame from the snapshot store.
    Capturing,

    /// The frame is with the isolated inference worker.
    Inferring,

    /// The description is being synthesized and played.
    Speaking,
}

impl PipelinePhase {
    /// Returns `true` while a run is in progress.
    ///
    /// ```
    /// use narrate::pipeline::PipelinePhase;
    ///
    /// assert!(!PipelinePhase::Idle.is_busy());
    /// assert!(PipelinePhase::Inferring.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        !matches!(self, PipelinePhase::Idle)
    }

    /// A short human-readable label suitable for a status bar.
    pub fn label(&self) -> &'static str {
        match self {
            PipelinePhase::Idle => "Idle",
            PipelinePhase::Triggered => "Triggered",
            PipelinePhase::Capturing => "Capturing",
            PipelinePhase::Inferring => "Inferring",
            PipelinePhase::Speaking => "Speaking",
        }
    }
}

// ---------------------------------------------------------------------------
// TriggerSource
// ---------------------------------------------------------------------------

/// Who asked for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// A UI button or API call.
    Manual,
    /// The voice trigger listener heard the trigger phrase.
    Voice,
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    /// The run has not finished yet.
    None,
    /// The description that was produced (and spoken).
    Text(String),
    /// The failure that ended the run.
    Error(ErrorKind),
}

/// Ephemeral record of one pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Monotonic run number, unique for the process lifetime.
    pub id: u64,
    /// What triggered this run.
    pub source: TriggerSource,
    /// When the trigger was accepted.
    pub started_at: Instant,
    /// Furthest phase the run reached.
    pub phase: PipelinePhase,
    /// How the run ended.
    pub result: RunResult,
}

impl PipelineRun {
    pub fn new(id: u64, source: TriggerSource) -> Self {
        Self {
            id,
            source,
            started_at: Instant::now(),
            phase: PipelinePhase::Idle,
            result: RunResult::None,
        }
    }

    /// Move the run forward to `phase`.
    ///
    /// Returns `false` (and leaves the run untouched) for a backwards move;
    /// the return to `Idle` is not recorded here, `phase` keeps the furthest
    /// phase reached.
    pub fn advance(&mut self, phase: PipelinePhase) -> bool {
        if phase <= self.phase {
            return false;
        }
        self.phase = phase;
        true
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, RunResult::Text(_))
    }

    /// The error kind the run ended with, if any.
    pub fn error(&self) -> Option<ErrorKind> {
        match self.result {
            RunResult::Error(kind) => Some(kind),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
