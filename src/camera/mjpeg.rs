//! Splits a raw MJPEG byte stream into individual JPEG images.
//!
//! The camera program writes concatenated JPEGs to a pipe with no framing,
//! and pipe reads cut anywhere.  [`MjpegSplitter`] buffers bytes and emits
//! every complete `FF D8 .. FF D9` span it finds.

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Unframed data beyond this is assumed to be garbage.
const MAX_PENDING: usize = 2 * 1024 * 1024;
/// How much of an oversize buffer survives the purge, in case a marker
/// straddles the cut.
const KEEP_AFTER_PURGE: usize = 1024;

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[derive(Debug, Default)]
pub struct MjpegSplitter {
    buf: Vec<u8>,
}

impl MjpegSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed `chunk` and return the JPEGs it completed, oldest first.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        loop {
            let Some(start) = find(&self.buf, &SOI, consumed) else {
                break;
            };
            let Some(end) = find(&self.buf, &EOI, start + SOI.len()) else {
                break;
            };
            let end = end + EOI.len();
            frames.push(self.buf[start..end].to_vec());
            consumed = end;
        }
        self.buf.drain(..consumed);

        if self.buf.len() > MAX_PENDING {
            log::debug!("camera: discarding {} unframed bytes", self.buf.len());
            let keep_from = self.buf.len() - KEEP_AFTER_PURGE;
            self.buf.drain(..keep_from);
        }

        frames
    }

    /// Bytes held while waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
