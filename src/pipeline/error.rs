//! Error taxonomy for pipeline runs.
//!
//! Every failure inside a run is converted into a [`PipelineError`] at the
//! state-machine boundary; its [`ErrorKind`] is what subscribers see on the
//! `error` event.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::inference::InferenceError;
use crate::playback::PlaybackError;
use crate::speech::SpeechError;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Machine-readable failure category carried by error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The single-flight lock was held; the trigger was rejected.
    Busy,
    /// No frame had been captured yet.
    NoFrame,
    /// The inference worker did not answer within the timeout.
    InferenceTimeout,
    /// The worker could not attach to the accelerator.
    DeviceUnavailable,
    /// A collaborator (vision, speech, player) reported a failure.
    EngineError,
    /// Playback was stopped on request.  Informational only.
    PlaybackInterrupted,
    /// The voice listener could not start its recognizer.
    RecognizerUnavailable,
    /// A run task died unexpectedly.
    Internal,
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("pipeline is busy")]
    Busy,

    #[error("no camera frame available")]
    NoFrame,

    #[error("inference did not finish within {0:?}")]
    InferenceTimeout(Duration),

    #[error("inference device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("{0}")]
    Engine(String),

    #[error("playback interrupted")]
    PlaybackInterrupted,

    #[error("speech recognizer unavailable: {0}")]
    RecognizerUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Busy => ErrorKind::Busy,
            PipelineError::NoFrame => ErrorKind::NoFrame,
            PipelineError::InferenceTimeout(_) => ErrorKind::InferenceTimeout,
            PipelineError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            PipelineError::Engine(_) => ErrorKind::EngineError,
            PipelineError::PlaybackInterrupted => ErrorKind::PlaybackInterrupted,
            PipelineError::RecognizerUnavailable(_) => ErrorKind::RecognizerUnavailable,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<InferenceError> for PipelineError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::Timeout(after) => PipelineError::InferenceTimeout(after),
            InferenceError::DeviceUnavailable(msg) => PipelineError::DeviceUnavailable(msg),
            other => PipelineError::Engine(format!("inference failed: {other}")),
        }
    }
}

impl From<SpeechError> for PipelineError {
    fn from(e: SpeechError) -> Self {
        PipelineError::Engine(format!("speech synthesis failed: {e}"))
    }
}

impl From<PlaybackError> for PipelineError {
    fn from(e: PlaybackError) -> Self {
        PipelineError::Engine(format!("playback failed: {e}"))
    }
}
