//! Trigger phrase matching with a cooldown.

use std::time::{Duration, Instant};

/// Fires when the trigger phrase appears anywhere in a transcript.
///
/// Matching ignores case, punctuation and repeated whitespace, so
/// `"Capture, image!"` matches `"capture image"`.  After a match, further
/// matches are ignored until more than `cooldown` has passed.
#[derive(Debug, Clone)]
pub struct TriggerDetector {
    phrase: String,
    cooldown: Duration,
    last_fire: Option<Instant>,
}

impl TriggerDetector {
    pub fn new(phrase: &str, cooldown: Duration) -> Self {
        Self {
            phrase: normalize(phrase),
            cooldown,
            last_fire: None,
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Whether `text`, heard at `now`, should fire the pipeline.
    pub fn check(&mut self, text: &str, now: Instant) -> bool {
        if self.phrase.is_empty() || !normalize(text).contains(&self.phrase) {
            return false;
        }
        if let Some(last) = self.last_fire {
            if now.saturating_duration_since(last) <= self.cooldown {
                log::debug!("listener: trigger phrase within cooldown, ignored");
                return false;
            }
        }
        self.last_fire = Some(now);
        true
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
