//! The isolated inference worker: both ends of the process boundary.
//!
//! ```text
//! orchestrator                                  worker process (`narrate worker`)
//! ────────────                                  ─────────────────────────────────
//! ProcessLauncher::launch ──exec──────────────▶ run_worker: init engine
//!                         ◀── ready / init_failed ──┘
//! ProcessWorker::describe ── describe {id, …} ─▶ engine.describe (blocking)
//!                         ◀── described / failed ───┘
//! ```
//!
//! The worker is started with a fresh `exec` of the current binary.  Rust
//! opens every descriptor close-on-exec, so the child inherits nothing but
//! the two protocol pipes and stderr, and the engine attaches to its device
//! from a clean state.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::engine::{EngineError, VisionEngine};
use super::protocol::{decode_frame, FailureKind, WorkerReply, WorkerRequest};
use crate::camera::DecodedFrame;

// ---------------------------------------------------------------------------
// InferenceError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("inference device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("vision engine error: {0}")]
    Engine(String),

    #[error("inference worker exited unexpectedly")]
    WorkerExited,

    #[error("inference worker protocol error: {0}")]
    Protocol(String),

    #[error("failed to start inference worker: {0}")]
    Spawn(String),
}

// ---------------------------------------------------------------------------
// Worker side
// ---------------------------------------------------------------------------

/// Serve describe requests from `input` until it closes.
///
/// `init` runs first; its failure is reported as `init_failed` and the
/// function returns without reading any request.
pub fn run_worker<E, F>(init: F, input: impl BufRead, mut output: impl Write) -> std::io::Result<()>
where
    E: VisionEngine,
    F: FnOnce() -> Result<E, EngineError>,
{
    let mut engine = match init() {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("worker: engine init failed: {e}");
            return send(&mut output, &WorkerReply::InitFailed {
                message: e.to_string(),
            });
        }
    };
    send(&mut output, &WorkerReply::Ready)?;
    log::info!("worker: ready");

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<WorkerRequest>(&line) {
            Ok(WorkerRequest::Describe {
                id,
                width,
                height,
                pixels,
            }) => match decode_frame(width, height, &pixels) {
                Ok(frame) => {
                    let started = std::time::Instant::now();
                    let result = engine.describe(&frame);
                    log::info!("worker: request {id} took {:?}", started.elapsed());
                    match result {
                        Ok(text) => WorkerReply::Described { id, text },
                        Err(EngineError::Device(message)) => WorkerReply::Failed {
                            id,
                            kind: FailureKind::Device,
                            message,
                        },
                        Err(EngineError::Failed(message)) => WorkerReply::Failed {
                            id,
                            kind: FailureKind::Engine,
                            message,
                        },
                    }
                }
                Err(message) => WorkerReply::Failed {
                    id,
                    kind: FailureKind::Engine,
                    message,
                },
            },
            Err(e) => WorkerReply::Failed {
                id: 0,
                kind: FailureKind::Engine,
                message: format!("unreadable request: {e}"),
            },
        };
        send(&mut output, &reply)?;
    }

    log::info!("worker: input closed, exiting");
    Ok(())
}

fn send(output: &mut impl Write, reply: &WorkerReply) -> std::io::Result<()> {
    serde_json::to_writer(&mut *output, reply)?;
    output.write_all(b"\n")?;
    output.flush()
}

// ---------------------------------------------------------------------------
// Orchestrator side: traits
// ---------------------------------------------------------------------------

/// A live worker.  `describe` may be abandoned mid-flight (timeout); the
/// owner must then call `terminate` and never reuse the worker.
#[async_trait]
pub trait InferenceWorker: Send {
    async fn describe(&mut self, frame: &DecodedFrame) -> Result<String, InferenceError>;

    /// Best-effort shutdown.
    async fn terminate(&mut self);
}

/// Starts workers.  Initialisation failure maps to
/// [`InferenceError::DeviceUnavailable`].
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn InferenceWorker>, InferenceError>;
}

// ---------------------------------------------------------------------------
// ProcessLauncher / ProcessWorker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    startup_timeout: Duration,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, startup_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            startup_timeout,
        }
    }

    /// Re-run this binary in worker mode, passing the same settings file.
    pub fn current_exe(
        config_path: Option<&Path>,
        startup_timeout: Duration,
    ) -> std::io::Result<Self> {
        let mut args = vec!["worker".to_string()];
        if let Some(path) = config_path {
            args.push("--config".into());
            args.push(path.display().to_string());
        }
        Ok(Self::new(std::env::current_exe()?, args, startup_timeout))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self) -> Result<Box<dyn InferenceWorker>, InferenceError> {
        log::info!("inference: starting worker {}", self.program.display());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InferenceError::Spawn(format!("{}: {e}", self.program.display())))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(InferenceError::Spawn("worker pipes missing".into()));
        };
        let mut lines = BufReader::new(stdout).lines();

        let first = tokio::time::timeout(self.startup_timeout, lines.next_line())
            .await
            .map_err(|_| {
                InferenceError::DeviceUnavailable(format!(
                    "worker not ready within {:?}",
                    self.startup_timeout
                ))
            })?
            .map_err(|e| InferenceError::DeviceUnavailable(e.to_string()))?
            .ok_or_else(|| {
                InferenceError::DeviceUnavailable("worker exited during startup".into())
            })?;

        match serde_json::from_str::<WorkerReply>(&first) {
            Ok(WorkerReply::Ready) => {
                log::info!("inference: worker ready (pid {:?})", child.id());
                Ok(Box::new(ProcessWorker {
                    child,
                    stdin,
                    lines,
                    next_id: 1,
                }))
            }
            Ok(WorkerReply::InitFailed { message }) => {
                Err(InferenceError::DeviceUnavailable(message))
            }
            Ok(other) => Err(InferenceError::Protocol(format!(
                "unexpected startup reply {other:?}"
            ))),
            Err(e) => Err(InferenceError::Protocol(format!("startup line: {e}"))),
        }
    }
}

struct ProcessWorker {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

#[async_trait]
impl InferenceWorker for ProcessWorker {
    async fn describe(&mut self, frame: &DecodedFrame) -> Result<String, InferenceError> {
        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_vec(&WorkerRequest::describe(id, frame))
            .map_err(|e| InferenceError::Protocol(e.to_string()))?;
        line.push(b'\n');

        self.stdin
            .write_all(&line)
            .await
            .map_err(|_| InferenceError::WorkerExited)?;
        self.stdin
            .flush()
            .await
            .map_err(|_| InferenceError::WorkerExited)?;

        let reply = self
            .lines
            .next_line()
            .await
            .map_err(|_| InferenceError::WorkerExited)?
            .ok_or(InferenceError::WorkerExited)?;

        match serde_json::from_str::<WorkerReply>(&reply) {
            Ok(WorkerReply::Described { id: got, text }) if got == id => Ok(text),
            Ok(WorkerReply::Failed {
                id: got,
                kind,
                message,
            }) if got == id || got == 0 => Err(match kind {
                FailureKind::Device => InferenceError::DeviceUnavailable(message),
                FailureKind::Engine => InferenceError::Engine(message),
            }),
            Ok(other) => Err(InferenceError::Protocol(format!(
                "reply {other:?} does not answer request {id}"
            ))),
            Err(e) => Err(InferenceError::Protocol(e.to_string())),
        }
    }

    async fn terminate(&mut self) {
        if let Err(e) = self.child.start_kill() {
            log::debug!("inference: worker already gone: {e}");
        }
        let _ = self.child.wait().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
