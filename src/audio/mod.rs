//! Audio input for the voice trigger listener.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc, timestamped)
//!           → StreamResampler (downmix, 16 kHz) → SampleWindow → VadDetector
//! ```

pub mod buffer;
pub mod capture;
pub mod resample;
pub mod vad;

pub use buffer::SampleWindow;
pub use capture::{AudioCapture, AudioChunk, CaptureError, ChunkSender, StreamHandle};
pub use resample::{downmix, StreamResampler, TARGET_RATE};
pub use vad::VadDetector;
