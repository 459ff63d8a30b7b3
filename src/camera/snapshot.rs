//! The latest camera frame, kept in decoded and encoded form together.
//!
//! The camera reader is the only writer; the pipeline and the video feed are
//! readers.  A snapshot is built completely before it is swapped in, and
//! readers receive an `Arc` to it, so a reader can never see pixels from one
//! capture next to JPEG bytes from another.  The store's mutex only guards
//! the pointer swap; JPEG decoding happens before it is taken.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use image::ImageFormat;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DecodedFrame
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("pixel buffer is {actual} bytes, expected {expected} for {width}x{height} RGB")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("JPEG decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Tightly packed RGB8 pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

impl DecodedFrame {
    /// Checks that `pixels` holds exactly `width * height * 3` bytes.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(FrameError::SizeMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels: pixels.into(),
        })
    }

    pub fn from_jpeg(bytes: &[u8]) -> Result<Self, FrameError> {
        let rgb = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(width, height, rgb.into_raw())
    }
}

// ---------------------------------------------------------------------------
// FrameSnapshot
// ---------------------------------------------------------------------------

/// One capture.  Immutable once published.
#[derive(Debug)]
pub struct FrameSnapshot {
    /// Increases by one per publish.
    pub seq: u64,
    pub decoded: DecodedFrame,
    pub encoded: Arc<[u8]>,
    pub captured_at: SystemTime,
}

// ---------------------------------------------------------------------------
// FrameStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FrameStore {
    current: Mutex<Option<Arc<FrameSnapshot>>>,
    frozen: Mutex<Option<(Arc<FrameSnapshot>, Instant)>>,
    next_seq: AtomicU64,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot with a new one built from `decoded` and
    /// `encoded`, which must come from the same capture.
    pub fn publish(&self, decoded: DecodedFrame, encoded: impl Into<Arc<[u8]>>) -> u64 {
        let mut current = self.current.lock().unwrap();
        // Assigned under the lock so seq order matches swap order.
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        *current = Some(Arc::new(FrameSnapshot {
            seq,
            decoded,
            encoded: encoded.into(),
            captured_at: SystemTime::now(),
        }));
        seq
    }

    /// Decode `jpeg` and publish it alongside its own bytes.
    pub fn publish_jpeg(&self, jpeg: Vec<u8>) -> Result<u64, FrameError> {
        let decoded = DecodedFrame::from_jpeg(&jpeg)?;
        Ok(self.publish(decoded, jpeg))
    }

    /// The most recent snapshot, if any frame has arrived yet.
    pub fn read(&self) -> Option<Arc<FrameSnapshot>> {
        self.current.lock().unwrap().clone()
    }

    /// Show `snapshot` on the video feed for `duration` instead of the live
    /// frame.
    pub fn freeze(&self, snapshot: Arc<FrameSnapshot>, duration: Duration) {
        *self.frozen.lock().unwrap() = Some((snapshot, Instant::now() + duration));
    }

    /// What the video feed should show now: the frozen frame until it
    /// expires, otherwise the live one.
    pub fn display_frame(&self) -> Option<Arc<FrameSnapshot>> {
        {
            let mut frozen = self.frozen.lock().unwrap();
            match frozen.as_ref() {
                Some((snapshot, until)) if Instant::now() < *until => {
                    return Some(Arc::clone(snapshot))
                }
                Some(_) => *frozen = None,
                None => {}
            }
        }
        self.read()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// A frame whose every byte is `fill`, with matching "encoded" bytes, so
    /// a torn read would be visible as a mismatch.
    fn frame(fill: u8) -> (DecodedFrame, Vec<u8>) {
        let decoded = DecodedFrame::new(4, 2, vec![fill; 4 * 2 * 3]).unwrap();
        (decoded, vec![fill; 16])
    }

    #[test]
    fn empty_store_reads_none() {
        let store = FrameStore::new();
        assert!(store.read().is_none());
        assert!(store.display_frame().is_none());
    }

    #[test]
    fn decoded_frame_validates_length() {
        assert!(DecodedFrame::new(2, 2, vec![0; 12]).is_ok());
        assert!(matches!(
            DecodedFrame::new(2, 2, vec![0; 11]),
            Err(FrameError::SizeMismatch { expected: 12, .. })
        ));
    }

    #[test]
    fn publish_replaces_and_numbers_snapshots() {
        let store = FrameStore::new();
        let (d, e) = frame(1);
        assert_eq!(store.publish(d, e), 1);
        let (d, e) = frame(2);
        assert_eq!(store.publish(d, e), 2);

        let snap = store.read().unwrap();
        assert_eq!(snap.seq, 2);
        assert_eq!(snap.encoded[0], 2);
    }

    #[test]
    fn readers_keep_their_snapshot_after_replacement() {
        let store = FrameStore::new();
        let (d, e) = frame(1);
        store.publish(d, e);
        let held = store.read().unwrap();

        let (d, e) = frame(9);
        store.publish(d, e);

        assert_eq!(held.decoded.pixels[0], 1);
        assert_eq!(held.encoded[0], 1);
    }

    #[test]
    fn concurrent_reads_never_see_a_mix_of_captures() {
        let store = Arc::new(FrameStore::new());
        let (d, e) = frame(0);
        store.publish(d, e);

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..2_000u32 {
                    let (d, e) = frame((i % 251) as u8);
                    store.publish(d, e);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let snap = store.read().unwrap();
                        let fill = snap.encoded[0];
                        assert!(snap.encoded.iter().all(|&b| b == fill));
                        assert!(snap.decoded.pixels.iter().all(|&b| b == fill));
                        assert_eq!(snap.decoded.pixels.len(), 4 * 2 * 3);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }

    #[test]
    fn frozen_frame_shown_until_expiry() {
        let store = FrameStore::new();
        let (d, e) = frame(1);
        store.publish(d, e);
        let captured = store.read().unwrap();
        store.freeze(Arc::clone(&captured), Duration::from_millis(40));

        let (d, e) = frame(2);
        store.publish(d, e);
        assert_eq!(store.display_frame().unwrap().seq, captured.seq);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(store.display_frame().unwrap().seq, 2);
    }

    #[test]
    fn publish_jpeg_rejects_garbage() {
        let store = FrameStore::new();
        assert!(store.publish_jpeg(vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9]).is_err());
        assert!(store.read().is_none());
    }

    #[test]
    fn publish_jpeg_decodes_real_image() {
        let img = image::RgbImage::from_pixel(8, 6, image::Rgb([200, 10, 10]));
        let mut jpeg = std::io::Cursor::new(Vec::new());
        img.write_to(&mut jpeg, ImageFormat::Jpeg).unwrap();

        let store = FrameStore::new();
        store.publish_jpeg(jpeg.into_inner()).unwrap();
        let snap = store.read().unwrap();
        assert_eq!((snap.decoded.width, snap.decoded.height), (8, 6));
        assert_eq!(snap.decoded.pixels.len(), 8 * 6 * 3);
    }
}
