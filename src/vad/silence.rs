//! End-of-utterance detection: threshold plus dwell time.
//!
//! Loudness below the threshold starts a dwell clock; once the clock has
//! run for the full silence duration the utterance is over. Any voiced
//! frame clears the clock completely, so pre-speech silence never counts
//! toward a post-speech stop. There is no minimum speech length: a session
//! that opens in silence ends after one full dwell.

use std::time::{Duration, Instant};

/// Loudness below this counts as silence.
pub const DEFAULT_THRESHOLD: f32 = 0.03;

/// How long loudness must stay below the threshold before the utterance ends.
pub const DEFAULT_SILENCE_DURATION: Duration = Duration::from_millis(2000);

/// Outcome of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    UtteranceEnded,
}

/// Tracks the silence window for one capture session.
#[derive(Debug)]
pub struct SilenceDetector {
    threshold: f32,
    silence_duration: Duration,
    silence_started_at: Option<Instant>,
    fired: bool,
}

impl SilenceDetector {
    pub fn new(threshold: f32, silence_duration: Duration) -> Self {
        Self {
            threshold,
            silence_duration,
            silence_started_at: None,
            fired: false,
        }
    }

    /// Feed one loudness reading. Emits `UtteranceEnded` exactly once per
    /// session; after that the detector goes quiet until [`reset`].
    ///
    /// [`reset`]: SilenceDetector::reset
    pub fn observe(&mut self, loudness: f32, now: Instant) -> Verdict {
        if self.fired {
            return Verdict::Continue;
        }
        if loudness >= self.threshold {
            self.silence_started_at = None;
            return Verdict::Continue;
        }
        let started = *self.silence_started_at.get_or_insert(now);
        if now.duration_since(started) > self.silence_duration {
            self.fired = true;
            Verdict::UtteranceEnded
        } else {
            Verdict::Continue
        }
    }

    /// Clear the window and re-arm, for a fresh capture session.
    pub fn reset(&mut self) {
        self.silence_started_at = None;
        self.fired = false;
    }
}

impl Default for SilenceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_SILENCE_DURATION)
    }
}
