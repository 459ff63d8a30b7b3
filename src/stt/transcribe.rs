//! Decoding parameters for the listener's Whisper runs.
//!
//! Only short utterances are decoded, and they are decoded often, so the
//! defaults favour latency: greedy decoding with a single candidate.

/// Parameters for one Whisper run.
///
/// ```
/// use narrate::stt::TranscribeParams;
///
/// let params = TranscribeParams::for_language("auto");
/// assert_eq!(params.language, "auto");
/// assert_eq!(params.best_of, 1);
/// ```
#[derive(Debug, Clone)]
pub struct TranscribeParams {
    /// ISO-639-1 language code, or `"auto"` for detection.
    pub language: String,
    /// Greedy candidates per step.
    pub best_of: i32,
    /// CPU threads handed to Whisper.
    pub n_threads: i32,
}

impl TranscribeParams {
    pub fn for_language(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }
}

impl Default for TranscribeParams {
    fn default() -> Self {
        Self {
            language: "en".into(),
            best_of: 1,
            n_threads: listener_threads(),
        }
    }
}

/// At most 4: the listener shares the board with the camera reader and the
/// HTTP server.
fn listener_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4) as i32)
        .unwrap_or(2)
}
