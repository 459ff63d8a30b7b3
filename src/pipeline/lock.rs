//! Single-flight guard: at most one pipeline run at a time.
//!
//! Two acquisition policies share one `tokio::sync::Mutex<()>`:
//!
//! * [`SingleFlight::acquire`] waits up to a timeout (manual triggers).
//! * [`SingleFlight::try_acquire`] never waits (voice triggers are advisory
//!   and are dropped when a run is active).
//!
//! The returned [`RunGuard`] releases the lock when dropped, so every exit
//! path of a run releases it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::PipelineError;

/// Owned proof that the caller holds the pipeline lock.
pub struct RunGuard {
    _guard: OwnedMutexGuard<()>,
}

impl std::fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RunGuard")
    }
}

/// Cheap to clone; all clones guard the same slot.
#[derive(Clone, Default)]
pub struct SingleFlight {
    slot: Arc<Mutex<()>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `wait` for the lock; [`PipelineError::Busy`] on timeout.
    pub async fn acquire(&self, wait: Duration) -> Result<RunGuard, PipelineError> {
        match tokio::time::timeout(wait, Arc::clone(&self.slot).lock_owned()).await {
            Ok(guard) => Ok(RunGuard { _guard: guard }),
            Err(_) => Err(PipelineError::Busy),
        }
    }

    /// Take the lock only if it is free right now.
    pub fn try_acquire(&self) -> Result<RunGuard, PipelineError> {
        Arc::clone(&self.slot)
            .try_lock_owned()
            .map(|guard| RunGuard { _guard: guard })
            .map_err(|_| PipelineError::Busy)
    }

    /// Whether a run currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.slot.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let lock = SingleFlight::new();
        let guard = lock.try_acquire().expect("free lock");
        assert!(lock.is_held());
        assert!(matches!(lock.try_acquire(), Err(PipelineError::Busy)));

        drop(guard);
        assert!(!lock.is_held());
        assert!(lock.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn acquire_times_out_with_busy() {
        let lock = SingleFlight::new();
        let _guard = lock.try_acquire().unwrap();

        let started = std::time::Instant::now();
        let result = lock.acquire(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(PipelineError::Busy)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let lock = SingleFlight::new();
        let guard = lock.try_acquire().unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire(Duration::from_secs(5)).await.is_ok() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_non_blocking_attempts_admit_exactly_one() {
        let lock = SingleFlight::new();
        let mut handles = Vec::new();
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        for _ in 0..16 {
            let lock = lock.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                let guard = lock.try_acquire();
                let won = guard.is_ok();
                // Hold long enough for every contender to have tried.
                tokio::time::sleep(Duration::from_millis(50)).await;
                drop(guard);
                won
            }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
