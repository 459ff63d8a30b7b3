//! Bounded window of recent 16 kHz samples for the recognizer.
//!
//! [`SampleWindow`] holds at most `capacity` samples.  Pushing past the limit
//! evicts the oldest audio, so a speaker who never pauses produces a window
//! of "the last N seconds" instead of an ever-growing buffer.
//!
//! ```rust
//! use narrate::audio::SampleWindow;
//!
//! let mut window = SampleWindow::new(4);
//! window.extend(&[1.0, 2.0, 3.0, 4.0, 5.0]);
//! assert!(window.is_full());
//! assert_eq!(window.samples(), &[2.0, 3.0, 4.0, 5.0]);
//! ```

use std::collections::VecDeque;

pub struct SampleWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleWindow {
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be > 0");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `data`, evicting the oldest samples beyond capacity.
    pub fn extend(&mut self, data: &[f32]) {
        // Only the newest `capacity` samples of an oversized push survive.
        let data = &data[data.len().saturating_sub(self.capacity)..];
        let overflow = (self.samples.len() + data.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(data);
    }

    /// The window in chronological order, as one slice.
    pub fn samples(&mut self) -> &[f32] {
        self.samples.make_contiguous()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Seconds of audio held, at `sample_rate` Hz mono.
    pub fn seconds(&self, sample_rate: u32) -> f32 {
        match sample_rate {
            0 => 0.0,
            rate => self.samples.len() as f32 / rate as f32,
        }
    }
}
