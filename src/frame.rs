/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use web_time::{Duration, Instant};

/// Opaque identifier for one remote voice participant.
///
/// Stable for the lifetime of the voice session; used as the key for all
/// per-participant buffering and state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One block of raw mono PCM16 audio for a single participant.
///
/// The frame owns its samples: the delivery boundary copies the producer's
/// buffer exactly once, because the producer (a real-time callback) reuses its
/// buffer immediately after delivery.
#[derive(Debug, Clone)]
pub struct PcmFrame {
    /// Owned mono samples
    samples: Vec<i16>,
    /// Sample rate of the audio data
    sample_rate: u32,
    /// Time when the frame was delivered
    arrival_time: Instant,
}

impl PcmFrame {
    /// Create a frame by copying the delivered samples.
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Self {
        Self {
            samples: samples.to_vec(),
            sample_rate,
            arrival_time: Instant::now(),
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration of audio in this frame
    pub fn duration_ms(&self) -> u32 {
        if self.sample_rate == 0 {
            return 0;
        }
        ((self.samples.len() as u64 * 1000) / self.sample_rate as u64) as u32
    }

    /// Get the age of this frame since delivery
    pub fn age(&self) -> Duration {
        self.arrival_time.elapsed()
    }

    /// Check if this frame is older than the given duration
    pub fn is_older_than(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_frame_copies_samples() {
        let mut producer_buf = vec![1i16, 2, 3, 4];
        let frame = PcmFrame::from_samples(&producer_buf, 48000);

        // Producer reuses its buffer; the frame must be unaffected.
        producer_buf.fill(0);
        assert_eq!(frame.samples(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_frame_duration() {
        let frame = PcmFrame::from_samples(&vec![0i16; 960], 48000);
        assert_eq!(frame.duration_ms(), 20);

        let frame = PcmFrame::from_samples(&[], 48000);
        assert_eq!(frame.duration_ms(), 0);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_frame_age() {
        let frame = PcmFrame::from_samples(&[0i16; 480], 48000);
        thread::sleep(Duration::from_millis(10));
        assert!(frame.age() >= Duration::from_millis(10));
        assert!(frame.is_older_than(Duration::from_millis(5)));
    }

    #[test]
    fn test_participant_id_roundtrip() {
        let id = ParticipantId::from("alice@example.com");
        assert_eq!(id.as_str(), "alice@example.com");
        assert_eq!(id.to_string(), "alice@example.com");
        assert_eq!(id, ParticipantId::new(String::from("alice@example.com")));
    }
}
