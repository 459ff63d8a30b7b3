//! Speech output: text-to-speech and the acknowledgment beep.

pub mod synthesizer;
pub mod tone;

pub use synthesizer::{PiperSynthesizer, SpeechError, SpeechSynthesizer};
pub use tone::ack_tone;
