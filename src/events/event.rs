//! Typed events published on the hub.
//!
//! Events are immutable once built and shared as `Arc<Event>` across all
//! subscriber queues.  The JSON form carries a `type` tag so the browser can
//! dispatch on it; the SSE event name comes from [`Event::name`].

use std::sync::Arc;

use base64::Engine as _;
use serde::{Serialize, Serializer};

use crate::pipeline::{ErrorKind, PipelinePhase, TriggerSource};

/// Severity of a [`Event::Log`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run started (`active: true`) or ended (`active: false`).
    Trigger { active: bool, source: TriggerSource },

    /// The pipeline entered `phase`.
    Status { phase: PipelinePhase },

    /// The frame a run captured.  The bytes are shared with the frame store.
    CapturedImage {
        seq: u64,
        #[serde(serialize_with = "as_base64")]
        jpeg: Arc<[u8]>,
    },

    /// The description produced by inference.
    Text { text: String },

    /// A run failed, or a background task reported a problem.
    Error { kind: ErrorKind, message: String },

    /// A human-readable log line for the UI's rolling log.
    Log { level: LogLevel, message: String },
}

impl Event {
    /// SSE event name for this variant.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Trigger { .. } => "trigger",
            Event::Status { .. } => "status",
            Event::CapturedImage { .. } => "captured_image",
            Event::Text { .. } => "text",
            Event::Error { .. } => "error",
            Event::Log { .. } => "log",
        }
    }

    pub fn status(phase: PipelinePhase) -> Self {
        Event::Status { phase }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Event::Error {
            kind,
            message: message.into(),
        }
    }
}

fn as_base64<S: Serializer>(bytes: &Arc<[u8]>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}
