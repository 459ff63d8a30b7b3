//! Vision inference behind a process boundary.
//!
//! The vision engine holds an exclusive device lock for the whole of a
//! `describe` call (several seconds).  Running it in the orchestrator would
//! stall everything sharing that context, so it runs in a separate worker
//! process and the orchestrator talks to it over pipes.
//!
//! ```text
//! Orchestrator ──submit──▶ InferenceBoundary ──▶ ProcessWorker ══pipes══▶ run_worker ──▶ VisionEngine
//!                          (timeout, pool of 1)                        (narrate worker)
//! ```

pub mod boundary;
pub mod engine;
pub mod protocol;
pub mod worker;

pub use boundary::InferenceBoundary;
pub use engine::{ApiVisionEngine, EngineError, VisionEngine, FALLBACK_DESCRIPTION};
pub use protocol::{FailureKind, WorkerReply, WorkerRequest};
pub use worker::{
    run_worker, InferenceError, InferenceWorker, ProcessLauncher, WorkerLauncher,
};
