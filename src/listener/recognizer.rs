//! Streaming speech recognition over a blocking STT engine.
//!
//! Whisper transcribes whole windows, not streams.  [`WindowedRecognizer`]
//! turns it into a streaming recognizer: audio accumulates in a
//! [`SampleWindow`] and the window is re-transcribed periodically.
//!
//! ```text
//! accept(samples)
//!   ├─ no voice heard yet ─────────────────────────────▶ Nothing
//!   ├─ trailing silence ≥ silence_secs or window full ──▶ Final(text), reset
//!   ├─ partial_interval_secs of new audio ─────────────▶ Partial(text)
//!   └─ otherwise ──────────────────────────────────────▶ Nothing
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::audio::{CaptureError, SampleWindow, VadDetector};
use crate::config::{AppPaths, ListenerConfig};
use crate::stt::{SttEngine, SttError, TranscribeParams, WhisperEngine};

/// Recognizers work on 16 kHz mono audio.
pub const SAMPLE_RATE: u32 = crate::audio::TARGET_RATE;

// ---------------------------------------------------------------------------
// Recognition / SpeechRecognizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Nothing,
    /// Best guess for the utterance so far.
    Partial(String),
    /// The utterance is over; the recognizer has started a new one.
    Final(String),
}

#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("speech recognizer unavailable: {0}")]
    Unavailable(String),

    #[error("microphone unavailable: {0}")]
    Microphone(#[from] CaptureError),
}

/// Incremental recognizer fed with 16 kHz mono audio.
pub trait SpeechRecognizer: Send {
    fn accept(&mut self, samples: &[f32]) -> Recognition;

    /// Forget the current utterance.
    fn reset(&mut self);
}

// ---------------------------------------------------------------------------
// WindowedRecognizer
// ---------------------------------------------------------------------------

pub struct WindowedRecognizer {
    engine: Arc<dyn SttEngine>,
    window: SampleWindow,
    vad: VadDetector,
    partial_every: usize,
    silence_samples: usize,
    since_partial: usize,
    heard_voice: bool,
}

impl WindowedRecognizer {
    pub fn new(engine: Arc<dyn SttEngine>, config: &ListenerConfig) -> Self {
        let samples = |secs: f32| (secs.max(0.0) * SAMPLE_RATE as f32) as usize;
        Self {
            engine,
            window: SampleWindow::new(samples(config.max_utterance_secs).max(1)),
            vad: VadDetector::new(config.vad_threshold),
            partial_every: samples(config.partial_interval_secs).max(1),
            silence_samples: samples(config.silence_secs).max(1),
            since_partial: 0,
            heard_voice: false,
        }
    }

    /// Load the Whisper model named by `config` and wrap it.
    pub fn load(config: &ListenerConfig, paths: &AppPaths) -> Result<Self, RecognizerError> {
        let path = paths.stt_model(&config.model);
        let engine = WhisperEngine::load(&path, TranscribeParams::for_language(&config.language))
            .map_err(|e| RecognizerError::Unavailable(e.to_string()))?;
        log::info!("listener: loaded speech model {}", path.display());
        Ok(Self::new(Arc::new(engine), config))
    }

    fn transcribe(&mut self) -> Option<String> {
        match self.engine.transcribe(self.window.samples()) {
            Ok(text) => clean(&text),
            Err(SttError::AudioTooShort) => None,
            Err(e) => {
                log::warn!("listener: transcription failed: {e}");
                None
            }
        }
    }
}

impl SpeechRecognizer for WindowedRecognizer {
    fn accept(&mut self, samples: &[f32]) -> Recognition {
        if samples.is_empty() {
            return Recognition::Nothing;
        }
        self.window.extend(samples);
        self.since_partial += samples.len();

        if !self.heard_voice {
            if !self.vad.has_voice(samples) {
                return Recognition::Nothing;
            }
            self.heard_voice = true;
        }

        let trailing = self.vad.trailing_silence(self.window.samples());
        if trailing >= self.silence_samples || self.window.is_full() {
            let text = self.transcribe();
            self.reset();
            return text.map_or(Recognition::Nothing, Recognition::Final);
        }

        if self.since_partial >= self.partial_every {
            self.since_partial = 0;
            if let Some(text) = self.transcribe() {
                return Recognition::Partial(text);
            }
        }
        Recognition::Nothing
    }

    fn reset(&mut self) {
        self.window.clear();
        self.since_partial = 0;
        self.heard_voice = false;
    }
}

/// Trimmed transcript, or `None` for blanks and Whisper's bracketed
/// non-speech markers such as `[BLANK_AUDIO]`.
fn clean(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() || (text.starts_with('[') && text.ends_with(']')) {
        return None;
    }
    Some(text.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
