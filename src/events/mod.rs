//! Event broadcast hub.
//!
//! The pipeline publishes every state transition here; each UI connection
//! holds a [`Subscription`] with its own bounded queue.
//!
//! ```rust
//! use std::time::Duration;
//! use narrate::events::{Event, EventHub};
//! use narrate::pipeline::PipelinePhase;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = EventHub::new(200, Duration::from_secs(15), 100);
//! let mut sub = hub.subscribe();
//! hub.publish(Event::status(PipelinePhase::Triggered));
//! assert!(sub.next().await.is_some());
//! # }
//! ```

pub mod event;
pub mod hub;

pub use event::{Event, LogLevel};
pub use hub::{Delivery, EventHub, LogEntry, Subscription};
