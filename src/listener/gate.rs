//! Echo suppression for the voice listener.
//!
//! The microphone hears the speaker.  While the pipeline is busy every chunk
//! is dropped, and when a busy window ends the recognizer is reset so no
//! half-heard audio from before or during the run leaks into the next
//! utterance.

use std::time::Instant;

use super::recognizer::SpeechRecognizer;
use crate::pipeline::BusyFlag;

pub struct EchoGate {
    busy: BusyFlag,
    seen_epoch: u64,
}

impl EchoGate {
    pub fn new(busy: BusyFlag) -> Self {
        let seen_epoch = busy.epoch();
        Self { busy, seen_epoch }
    }

    /// Whether a chunk captured at `captured_at` may reach the recognizer.
    pub fn admit(&mut self, captured_at: Instant, recognizer: &mut dyn SpeechRecognizer) -> bool {
        if self.busy.is_set() {
            return false;
        }

        let epoch = self.busy.epoch();
        if epoch != self.seen_epoch {
            self.seen_epoch = epoch;
            recognizer.reset();
            log::debug!("listener: pipeline idle again, recognizer reset");
        }

        // Chunks queued while busy can arrive after the clear.
        match self.busy.cleared_at() {
            Some(cleared) => captured_at > cleared,
            None => true,
        }
    }
}
