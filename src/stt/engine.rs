//! Speech-to-text engine trait and the Whisper implementation.
//!
//! [`SttEngine`] is object-safe and `Send + Sync` so the listener can hold it
//! behind an `Arc<dyn SttEngine>`.  [`WhisperEngine`] wraps a
//! `whisper_rs::WhisperContext`; [`MockSttEngine`] (tests only) returns a
//! canned transcript.

use std::path::Path;

use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::stt::transcribe::TranscribeParams;

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum SttError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("whisper context initialisation failed: {0}")]
    ContextInit(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    /// Fewer than [`MIN_AUDIO_SAMPLES`] samples.
    #[error("audio too short, minimum 0.5 s (8 000 samples at 16 kHz)")]
    AudioTooShort,

    /// More than [`MAX_AUDIO_SAMPLES`] samples.
    #[error("audio too long, maximum 30 s (480 000 samples at 16 kHz)")]
    AudioTooLong,
}

// ---------------------------------------------------------------------------
// SttEngine trait
// ---------------------------------------------------------------------------

/// Thread-safe speech-to-text interface.
///
/// `audio` is 16 kHz mono `f32`.  Inputs shorter than [`MIN_AUDIO_SAMPLES`]
/// or longer than [`MAX_AUDIO_SAMPLES`] are rejected.
pub trait SttEngine: Send + Sync {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError>;
}

/// 0.5 s at 16 kHz.
pub const MIN_AUDIO_SAMPLES: usize = 8_000;
/// 30 s at 16 kHz, Whisper's native window.
pub const MAX_AUDIO_SAMPLES: usize = 480_000;

fn check_length(audio: &[f32]) -> Result<(), SttError> {
    if audio.len() < MIN_AUDIO_SAMPLES {
        return Err(SttError::AudioTooShort);
    }
    if audio.len() > MAX_AUDIO_SAMPLES {
        return Err(SttError::AudioTooLong);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// WhisperEngine
// ---------------------------------------------------------------------------

/// Whisper-backed engine.  A fresh `WhisperState` is created per call, so one
/// engine can serve several threads without locking.
pub struct WhisperEngine {
    ctx: WhisperContext,
    params: TranscribeParams,
}

impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs; the model
// weights are read-only after loading.
unsafe impl Send for WhisperEngine {}
unsafe impl Sync for WhisperEngine {}

impl WhisperEngine {
    /// Load a GGML model from `model_path`.
    pub fn load(model_path: impl AsRef<Path>, params: TranscribeParams) -> Result<Self, SttError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        log::info!("stt: loaded {}", path.display());
        Ok(Self { ctx, params })
    }

    fn full_params(&self) -> FullParams<'_, '_> {
        let mut fp = FullParams::new(SamplingStrategy::Greedy {
            best_of: self.params.best_of,
        });
        let lang = (self.params.language != "auto").then_some(self.params.language.as_str());
        fp.set_language(lang);
        fp.set_n_threads(self.params.n_threads);
        // Trigger phrases never span segments, and partials of a growing
        // window must not condition on each other.
        fp.set_single_segment(true);
        fp.set_no_context(true);
        fp.set_print_special(false);
        fp.set_print_timestamps(false);
        fp.set_print_progress(false);
        fp.set_print_realtime(false);
        fp
    }
}

impl SttEngine for WhisperEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
        check_length(audio)?;

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        let started = std::time::Instant::now();
        state
            .full(self.full_params(), audio)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;
        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;
            text.push_str(&segment);
        }

        log::debug!(
            "stt: {:.1} s of audio in {} ms",
            audio.len() as f32 / 16_000.0,
            started.elapsed().as_millis()
        );
        Ok(text.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// MockSttEngine  (test-only)
// ---------------------------------------------------------------------------

/// Returns a pre-configured response without loading a model.  Enforces the
/// same length contract as the real engine and counts its calls.
#[cfg(test)]
pub struct MockSttEngine {
    response: Result<String, SttError>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSttEngine {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: Default::default(),
        }
    }

    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl SttEngine for MockSttEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        check_length(audio)?;
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
