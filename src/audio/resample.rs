//! Channel mixing and resampling for the listener's input path.
//!
//! Whisper wants 16 kHz mono `f32`.  USB conference microphones usually
//! deliver 48 kHz, sometimes stereo, in small callback-sized chunks.
//! [`StreamResampler`] converts chunk by chunk and carries its interpolation
//! position across chunk boundaries, so the output is one continuous signal
//! rather than a series of independently resampled fragments.  Linear
//! interpolation is plenty for trigger-phrase recognition.

/// Sample rate every recognizer input is converted to.
pub const TARGET_RATE: u32 = 16_000;

/// Average interleaved frames of `channels` samples into mono.
///
/// A trailing partial frame is ignored; `channels == 0` yields nothing.
///
/// ```rust
/// use narrate::audio::downmix;
///
/// let stereo = [1.0_f32, -1.0, 0.5, 0.5]; // L R L R
/// assert_eq!(downmix(&stereo, 2), vec![0.0, 0.5]);
/// ```
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = usize::from(n);
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// StreamResampler
// ---------------------------------------------------------------------------

/// Stateful downmix + resample to [`TARGET_RATE`].
///
/// The last input sample of each chunk is kept so the first output of the
/// next chunk can interpolate across the boundary.  Output may therefore lag
/// the input by one source sample; [`flush`](Self::flush) emits it.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    source_rate: u32,
    channels: u16,
    /// Source samples per output sample.
    step: f64,
    /// Position of the next output sample, relative to `prev` (index 0)
    /// when `prev` is set, else to the start of the next chunk.
    pos: f64,
    prev: Option<f32>,
}

impl StreamResampler {
    /// # Panics
    ///
    /// Panics if `source_rate == 0`.
    pub fn new(source_rate: u32, channels: u16) -> Self {
        assert!(source_rate > 0, "source_rate must be > 0");
        Self {
            source_rate,
            channels,
            step: f64::from(source_rate) / f64::from(TARGET_RATE),
            pos: 0.0,
            prev: None,
        }
    }

    /// Whether this resampler was built for chunks of this format.
    pub fn matches(&self, source_rate: u32, channels: u16) -> bool {
        self.source_rate == source_rate && self.channels == channels
    }

    /// Convert one interleaved chunk.
    pub fn process(&mut self, interleaved: &[f32]) -> Vec<f32> {
        let mono = downmix(interleaved, self.channels);
        if self.source_rate == TARGET_RATE || mono.is_empty() {
            return mono;
        }

        let mut input = Vec::with_capacity(mono.len() + 1);
        input.extend(self.prev);
        input.extend_from_slice(&mono);

        let last = input.len() - 1;
        let mut out = Vec::with_capacity((mono.len() as f64 / self.step).ceil() as usize + 1);
        while self.pos < last as f64 {
            let idx = self.pos as usize;
            let frac = (self.pos - idx as f64) as f32;
            out.push(input[idx] * (1.0 - frac) + input[idx + 1] * frac);
            self.pos += self.step;
        }

        self.pos -= last as f64;
        self.prev = Some(input[last]);
        out
    }

    /// Emit the outputs still waiting on a next sample, holding the last
    /// input value, and start over.
    pub fn flush(&mut self) -> Vec<f32> {
        let mut out = Vec::new();
        if let Some(prev) = self.prev {
            while self.pos < 1.0 {
                out.push(prev);
                self.pos += self.step;
            }
        }
        self.reset();
        out
    }

    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.prev = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
