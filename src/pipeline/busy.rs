//! Busy indicator shared between the orchestrator and the voice listener.
//!
//! The orchestrator sets it when a trigger is accepted (before the
//! acknowledgment beep) and clears it after the run returns to `Idle`.  The
//! listener reads it from its audio thread to discard its own speaker output.
//!
//! Every clear bumps an epoch counter and records the time, so the listener
//! can tell a busy window happened even if it never observed the flag set,
//! and can reject audio captured before the clear.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Default)]
struct BusyInner {
    busy: AtomicBool,
    epoch: AtomicU64,
    cleared_at: Mutex<Option<Instant>>,
}

#[derive(Clone, Default)]
pub struct BusyFlag {
    inner: Arc<BusyInner>,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.inner.busy.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        // Time and epoch first, so a reader that sees `busy == false` also
        // sees the matching epoch.
        *self.inner.cleared_at.lock().unwrap() = Some(Instant::now());
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.busy.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    /// Number of completed busy windows.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// When the flag was last cleared.
    pub fn cleared_at(&self) -> Option<Instant> {
        *self.inner.cleared_at.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear() {
        let flag = BusyFlag::new();
        assert!(!flag.is_set());
        assert_eq!(flag.epoch(), 0);
        assert!(flag.cleared_at().is_none());

        flag.set();
        assert!(flag.is_set());

        let before = Instant::now();
        flag.clear();
        assert!(!flag.is_set());
        assert_eq!(flag.epoch(), 1);
        assert!(flag.cleared_at().unwrap() >= before);
    }

    #[test]
    fn clones_share_state() {
        let flag = BusyFlag::new();
        let other = flag.clone();
        flag.set();
        assert!(other.is_set());
        other.clear();
        assert_eq!(flag.epoch(), 1);
    }
}
