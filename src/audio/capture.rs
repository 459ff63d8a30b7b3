//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle for the voice
//! listener.  Each hardware buffer is stamped with the instant it arrived, so
//! the listener's echo gate can discard audio recorded while the speaker was
//! active.  The returned [`StreamHandle`] stops the stream when dropped.
//!
//! Chunks travel over a bounded [`ChunkSender`]: when the consumer falls
//! behind, new audio is dropped and counted instead of queueing without
//! limit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// When the callback delivered this buffer.
    pub captured_at: Instant,
}

impl AudioChunk {
    /// Length of the chunk in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        let frames = self.samples.len() / usize::from(self.channels);
        frames as f32 / self.sample_rate as f32
    }
}

/// Keeps the cpal stream alive; dropping it stops capture.
pub struct StreamHandle {
    _stream: cpal::Stream,
    dropped: Arc<AtomicU64>,
}

impl StreamHandle {
    /// Chunks discarded because the consumer was behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// ChunkSender
// ---------------------------------------------------------------------------

/// Producer half of a bounded chunk queue.  Never blocks the audio thread.
pub struct ChunkSender {
    tx: mpsc::SyncSender<AudioChunk>,
    dropped: Arc<AtomicU64>,
}

impl ChunkSender {
    /// A queue holding at most `capacity` chunks.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<AudioChunk>) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let sender = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sender, rx)
    }

    /// Queue `chunk`, or drop it when the queue is full.  Returns whether it
    /// was queued.  A disconnected receiver is not counted as a drop.
    pub fn send(&self, chunk: AudioChunk) -> bool {
        match self.tx.try_send(chunk) {
            Ok(()) => true,
            Err(mpsc::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 500 == 0 {
                    log::warn!("audio: consumer behind, {dropped} chunks dropped so far");
                }
                false
            }
            Err(mpsc::TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
///
/// ```rust,no_run
/// use narrate::audio::{AudioCapture, ChunkSender, StreamResampler};
///
/// let (tx, rx) = ChunkSender::bounded(64);
/// let capture = AudioCapture::open(Some("EMEET")).unwrap();
/// let mut resampler = StreamResampler::new(capture.sample_rate(), capture.channels());
/// let _handle = capture.start(tx).unwrap();
/// while let Ok(chunk) = rx.recv() {
///     let _mono_16k = resampler.process(&chunk.samples);
/// }
/// ```
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    name: String,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Open the first input device whose name contains `name_hint`
    /// (case-insensitive), falling back to the system default input.
    pub fn open(name_hint: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        let preferred = match name_hint {
            Some(hint) => {
                let hint = hint.to_lowercase();
                host.input_devices()?.find(|d| {
                    d.name()
                        .map(|n| n.to_lowercase().contains(&hint))
                        .unwrap_or(false)
                })
            }
            None => None,
        };

        let device = match preferred {
            Some(device) => device,
            None => {
                if let Some(hint) = name_hint {
                    log::warn!("audio: no input device matching {hint:?}, using default");
                }
                host.default_input_device().ok_or(CaptureError::NoDevice)?
            }
        };

        let name = device.name().unwrap_or_else(|_| "<unnamed>".into());
        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        log::info!("audio: input device {name:?} at {sample_rate} Hz, {channels} ch");

        Ok(Self {
            device,
            config,
            name,
            sample_rate,
            channels,
        })
    }

    /// Start recording and send [`AudioChunk`]s through `tx`.
    pub fn start(&self, tx: ChunkSender) -> Result<StreamHandle, CaptureError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;
        let dropped = Arc::clone(&tx.dropped);

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                tx.send(AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                    captured_at: Instant::now(),
                });
            },
            |err: cpal::StreamError| {
                log::error!("audio: cpal stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        Ok(StreamHandle {
            _stream: stream,
            dropped,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_chunk_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioChunk>();
    }

    #[test]
    fn chunk_duration() {
        let chunk = AudioChunk {
            samples: vec![0.0; 960],
            sample_rate: 48_000,
            channels: 2,
            captured_at: Instant::now(),
        };
        assert!((chunk.duration_secs() - 0.01).abs() < 1e-6);

        let empty = AudioChunk {
            channels: 0,
            ..chunk
        };
        assert_eq!(empty.duration_secs(), 0.0);
    }

    fn chunk() -> AudioChunk {
        AudioChunk {
            samples: vec![0.0; 160],
            sample_rate: 16_000,
            channels: 1,
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn backlog_is_bounded_and_overflow_counted() {
        let (tx, rx) = ChunkSender::bounded(3);
        let queued = (0..10).filter(|_| tx.send(chunk())).count();
        assert_eq!(queued, 3);
        assert_eq!(tx.dropped(), 7);
        assert_eq!(rx.try_iter().count(), 3);

        // Room again once the consumer catches up.
        assert!(tx.send(chunk()));
        assert_eq!(tx.dropped(), 7);
    }

    #[test]
    fn closed_queue_is_not_an_overflow() {
        let (tx, rx) = ChunkSender::bounded(1);
        drop(rx);
        assert!(!tx.send(chunk()));
        assert_eq!(tx.dropped(), 0);
    }
}
