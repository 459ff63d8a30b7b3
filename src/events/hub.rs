//! Fan-out hub with one bounded queue per subscriber.
//!
//! ```text
//! publish(event) ──┬─ try_send ──▶ [queue 1] ──▶ Subscription::next ──▶ SSE client 1
//!                  ├─ try_send ──▶ [queue 2] ──▶ ...
//!                  └─ full / closed ──▶ subscriber removed
//! ```
//!
//! Publishing never waits on a subscriber.  A subscriber that falls behind
//! far enough to fill its queue is dropped; its stream ends and the client is
//! expected to reconnect.  Each queue is FIFO, so one subscriber sees events
//! in publish order.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::mpsc;

use super::event::{Event, LogLevel};
use crate::config::ServerConfig;

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

/// One line of the in-memory rolling log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Milliseconds since the Unix epoch.
    pub at_ms: u64,
    pub level: LogLevel,
    pub message: String,
}

// ---------------------------------------------------------------------------
// EventHub
// ---------------------------------------------------------------------------

struct HubInner {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Arc<Event>>>>,
    next_id: AtomicU64,
    capacity: usize,
    keep_alive: Duration,
    history: Mutex<VecDeque<LogEntry>>,
    history_limit: usize,
}

/// Cheap to clone; all clones share one subscriber set.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    /// `capacity` is the per-subscriber queue size, `keep_alive` the idle
    /// interval after which a subscriber receives [`Delivery::KeepAlive`].
    pub fn new(capacity: usize, keep_alive: Duration, history_limit: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                keep_alive,
                history: Mutex::new(VecDeque::with_capacity(history_limit)),
                history_limit,
            }),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.subscriber_capacity,
            Duration::from_secs(config.keep_alive_secs.max(1)),
            config.log_history,
        )
    }

    /// Deliver `event` to every live subscriber without waiting.
    pub fn publish(&self, event: Event) {
        let event = Arc::new(event);
        let mut subs = self.inner.subscribers.lock().unwrap();
        subs.retain(|id, tx| match tx.try_send(Arc::clone(&event)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("events: subscriber {id} fell behind, dropping it");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("events: subscriber {id} disconnected");
                false
            }
        });
    }

    /// Register a new subscriber.  Only events published after this call are
    /// delivered.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.inner.subscribers.lock().unwrap().insert(id, tx);
        log::debug!("events: subscriber {id} registered");

        Subscription {
            id,
            rx,
            keep_alive: self.inner.keep_alive,
            hub: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().unwrap().len()
    }

    /// Record a line in the rolling log, publish it, and mirror it to the
    /// process log.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => log::info!("{message}"),
            LogLevel::Warn => log::warn!("{message}"),
            LogLevel::Error => log::error!("{message}"),
        }

        if self.inner.history_limit > 0 {
            let at_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            let mut history = self.inner.history.lock().unwrap();
            if history.len() == self.inner.history_limit {
                history.pop_front();
            }
            history.push_back(LogEntry {
                at_ms,
                level,
                message: message.clone(),
            });
        }

        self.publish(Event::Log { level, message });
    }

    /// Oldest first.
    pub fn recent_logs(&self) -> Vec<LogEntry> {
        self.inner.history.lock().unwrap().iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// What a subscriber receives next.
#[derive(Debug, Clone)]
pub enum Delivery {
    Event(Arc<Event>),
    /// Nothing arrived within the keep-alive interval.
    KeepAlive,
}

/// One subscriber's end of the hub.  Dropping it unregisters the subscriber.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<Event>>,
    keep_alive: Duration,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event or keep-alive marker.
    ///
    /// Returns `None` once the hub has dropped this subscriber (or the hub
    /// itself is gone).  Events already queued are still delivered first.
    pub async fn next(&mut self) -> Option<Delivery> {
        match tokio::time::timeout(self.keep_alive, self.rx.recv()).await {
            Ok(Some(event)) => Some(Delivery::Event(event)),
            Ok(None) => None,
            Err(_) => Some(Delivery::KeepAlive),
        }
    }

    /// Adapt into a `Stream` that ends when the subscriber is dropped.
    pub fn into_stream(self) -> impl Stream<Item = Delivery> + Send + 'static {
        stream::unfold(self, |mut sub| async move {
            let delivery = sub.next().await?;
            Some((delivery, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            if let Ok(mut subs) = hub.subscribers.lock() {
                subs.remove(&self.id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
