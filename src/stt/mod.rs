//! Speech-to-text for the voice trigger listener.
//!
//! ```text
//! 16 kHz mono window ──▶ SttEngine::transcribe ──▶ transcript text
//!                           │
//!                           └─ WhisperEngine (whisper-rs, GGML model)
//! ```
//!
//! ```rust,no_run
//! use narrate::stt::{SttEngine, TranscribeParams, WhisperEngine};
//!
//! let engine = WhisperEngine::load("models/ggml-base.en.bin", TranscribeParams::default())
//!     .expect("model missing");
//! let text = engine.transcribe(&vec![0.0; 16_000]).unwrap();
//! println!("{text}");
//! ```

pub mod engine;
pub mod transcribe;

pub use engine::{SttEngine, SttError, WhisperEngine, MAX_AUDIO_SAMPLES, MIN_AUDIO_SAMPLES};
pub use transcribe::TranscribeParams;

#[cfg(test)]
pub use engine::MockSttEngine;
