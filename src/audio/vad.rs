//! Energy-based voice activity detection.
//!
//! The listener asks [`VadDetector`] two questions:
//!
//! * does this chunk contain speech at all ([`VadDetector::has_voice`])?
//!   Silent rooms never reach Whisper.
//! * how much silence trails the window ([`VadDetector::trailing_silence`])?
//!   Enough of it ends an utterance.
//!
//! Audio is split into 30 ms frames (480 samples at 16 kHz).  A frame counts
//! as voice when its RMS amplitude exceeds the threshold.

/// 30 ms at 16 kHz.
const FRAME: usize = 480;

/// ```rust
/// use narrate::audio::VadDetector;
///
/// let vad = VadDetector::new(0.01);
///
/// let mut audio = vec![0.0_f32; 480];
/// audio.extend(vec![0.5_f32; 480]);
/// audio.extend(vec![0.0_f32; 960]);
///
/// assert!(vad.has_voice(&audio));
/// assert_eq!(vad.trailing_silence(&audio), 960);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct VadDetector {
    rms_threshold: f32,
}

impl VadDetector {
    /// `rms_threshold` is in `[0.0, 1.0]`; 0.01 suits a quiet room.
    pub fn new(rms_threshold: f32) -> Self {
        Self { rms_threshold }
    }

    fn is_voice(&self, frame: &[f32]) -> bool {
        if frame.is_empty() {
            return false;
        }
        let energy = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        energy.sqrt() > self.rms_threshold
    }

    pub fn has_voice(&self, audio: &[f32]) -> bool {
        audio.chunks(FRAME).any(|f| self.is_voice(f))
    }

    /// Samples after the end of the last voice frame; the full length when
    /// there is no voice at all.
    pub fn trailing_silence(&self, audio: &[f32]) -> usize {
        match audio.chunks(FRAME).rposition(|f| self.is_voice(f)) {
            Some(last) => audio.len().saturating_sub((last + 1) * FRAME),
            None => audio.len(),
        }
    }
}
