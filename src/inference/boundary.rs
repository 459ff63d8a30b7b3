//! Pool-of-one front end to the inference worker.
//!
//! ```text
//! submit(frame)
//!   ├─ no worker? ──▶ launcher.launch()          (fails ⇒ DeviceUnavailable)
//!   ├─ timeout(describe(frame))
//!   │     ├─ Ok(text)   ──▶ keep worker, return text
//!   │     ├─ Err(e)     ──▶ discard worker, return e
//!   │     └─ timed out  ──▶ discard worker, return Timeout
//!   └─ discarded workers are killed in the background
//! ```
//!
//! Cancelling a stuck describe is best-effort: the abandoned worker may keep
//! the device busy until it dies.  The next submit always starts from a fresh
//! worker, so it never reuses possibly-poisoned engine state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::worker::{InferenceError, InferenceWorker, WorkerLauncher};
use crate::camera::DecodedFrame;

pub struct InferenceBoundary {
    launcher: Arc<dyn WorkerLauncher>,
    worker: Mutex<Option<Box<dyn InferenceWorker>>>,
    timeout: Duration,
}

impl InferenceBoundary {
    pub fn new(launcher: Arc<dyn WorkerLauncher>, timeout: Duration) -> Self {
        Self {
            launcher,
            worker: Mutex::new(None),
            timeout,
        }
    }

    /// Describe `frame`, waiting at most the configured timeout for the
    /// worker's answer.  Worker startup is bounded by the launcher's own
    /// startup timeout.
    pub async fn submit(&self, frame: &DecodedFrame) -> Result<String, InferenceError> {
        let mut slot = self.worker.lock().await;

        let mut worker = match slot.take() {
            Some(worker) => worker,
            None => self.launcher.launch().await?,
        };

        match tokio::time::timeout(self.timeout, worker.describe(frame)).await {
            Ok(Ok(text)) => {
                *slot = Some(worker);
                Ok(text)
            }
            Ok(Err(e)) => {
                log::warn!("inference: worker failed ({e}), discarding it");
                discard(worker);
                Err(e)
            }
            Err(_) => {
                log::warn!(
                    "inference: no answer within {:?}, abandoning worker",
                    self.timeout
                );
                discard(worker);
                Err(InferenceError::Timeout(self.timeout))
            }
        }
    }

    /// Start the worker ahead of the first request.
    pub async fn warm_up(&self) -> Result<(), InferenceError> {
        let mut slot = self.worker.lock().await;
        if slot.is_none() {
            *slot = Some(self.launcher.launch().await?);
        }
        Ok(())
    }

    /// Terminate the current worker, if any, and wait for it to exit.
    /// Waits for an in-flight request to finish first.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(mut worker) = worker {
            worker.terminate().await;
            log::info!("inference: worker stopped");
        }
    }

    pub async fn has_worker(&self) -> bool {
        self.worker.lock().await.is_some()
    }
}

fn discard(mut worker: Box<dyn InferenceWorker>) {
    tokio::spawn(async move {
        worker.terminate().await;
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// What the next launched worker does on `describe`.
    #[derive(Clone, Copy)]
    enum Behaviour {
        Answer,
        Hang,
        Fail,
    }

    struct FakeWorker {
        behaviour: Behaviour,
        terminated: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl InferenceWorker for FakeWorker {
        async fn describe(&mut self, frame: &DecodedFrame) -> Result<String, InferenceError> {
            match self.behaviour {
                Behaviour::Answer => Ok(format!("{} pixels wide", frame.width)),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
                Behaviour::Fail => Err(InferenceError::Engine("bad frame".into())),
            }
        }

        async fn terminate(&mut self) {
            self.terminated.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeLauncher {
        plan: std::sync::Mutex<Vec<Behaviour>>,
        launches: AtomicUsize,
        terminated: Arc<AtomicUsize>,
        device_missing: bool,
    }

    impl FakeLauncher {
        fn new(plan: Vec<Behaviour>) -> Arc<Self> {
            Arc::new(Self {
                plan: std::sync::Mutex::new(plan),
                launches: AtomicUsize::new(0),
                terminated: Arc::new(AtomicUsize::new(0)),
                device_missing: false,
            })
        }
    }

    #[async_trait]
    impl WorkerLauncher for FakeLauncher {
        async fn launch(&self) -> Result<Box<dyn InferenceWorker>, InferenceError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if self.device_missing {
                return Err(InferenceError::DeviceUnavailable("no device".into()));
            }
            let mut plan = self.plan.lock().unwrap();
            let behaviour = if plan.is_empty() {
                Behaviour::Answer
            } else {
                plan.remove(0)
            };
            Ok(Box::new(FakeWorker {
                behaviour,
                terminated: Arc::clone(&self.terminated),
            }))
        }
    }

    fn frame() -> DecodedFrame {
        DecodedFrame::new(2, 1, vec![0; 6]).unwrap()
    }

    #[tokio::test]
    async fn healthy_worker_is_reused() {
        let launcher = FakeLauncher::new(vec![]);
        let boundary = InferenceBoundary::new(launcher.clone(), Duration::from_secs(1));

        assert_eq!(boundary.submit(&frame()).await.unwrap(), "2 pixels wide");
        assert_eq!(boundary.submit(&frame()).await.unwrap(), "2 pixels wide");
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        assert!(boundary.has_worker().await);
    }

    #[tokio::test]
    async fn timeout_discards_worker_and_next_submit_recovers() {
        let launcher = FakeLauncher::new(vec![Behaviour::Hang]);
        let boundary = InferenceBoundary::new(launcher.clone(), Duration::from_millis(50));

        let err = boundary.submit(&frame()).await.unwrap_err();
        assert!(matches!(err, InferenceError::Timeout(d) if d == Duration::from_millis(50)));
        assert!(!boundary.has_worker().await);

        assert_eq!(boundary.submit(&frame()).await.unwrap(), "2 pixels wide");
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(launcher.terminated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn engine_failure_also_discards_worker() {
        let launcher = FakeLauncher::new(vec![Behaviour::Fail]);
        let boundary = InferenceBoundary::new(launcher.clone(), Duration::from_secs(1));

        assert!(matches!(
            boundary.submit(&frame()).await,
            Err(InferenceError::Engine(_))
        ));
        assert!(boundary.submit(&frame()).await.is_ok());
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn device_failure_surfaces_without_panicking() {
        let launcher = Arc::new(FakeLauncher {
            plan: std::sync::Mutex::new(vec![]),
            launches: AtomicUsize::new(0),
            terminated: Arc::new(AtomicUsize::new(0)),
            device_missing: true,
        });
        let boundary = InferenceBoundary::new(launcher.clone(), Duration::from_secs(1));

        assert!(matches!(
            boundary.submit(&frame()).await,
            Err(InferenceError::DeviceUnavailable(_))
        ));
        // Each submit retries the launch; nothing is cached.
        let _ = boundary.submit(&frame()).await;
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn warm_up_and_shutdown() {
        let launcher = FakeLauncher::new(vec![]);
        let boundary = InferenceBoundary::new(launcher.clone(), Duration::from_secs(1));

        boundary.warm_up().await.unwrap();
        boundary.warm_up().await.unwrap();
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);

        boundary.shutdown().await;
        assert!(!boundary.has_worker().await);
        // Terminated in place, not in the background.
        assert_eq!(launcher.terminated.load(Ordering::SeqCst), 1);

        boundary.shutdown().await;
        assert_eq!(launcher.terminated.load(Ordering::SeqCst), 1);
    }
}
