//! Audio output through an external player process.

pub mod controller;

pub use controller::{Playback, PlaybackController, PlaybackError, PlaybackOutcome};
