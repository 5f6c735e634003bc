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

//! Diagnostic counters for the voice pipeline
//!
//! All counters are eventually-consistent atomic reads; they inform dashboards
//! and tests, never playback decisions.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated from both timing domains.
#[derive(Debug, Default)]
pub struct VoiceStats {
    frames_received: AtomicU64,
    invalid_frames: AtomicU64,
    frames_evicted: AtomicU64,
    catchup_drops: AtomicU64,
    muted_drops: AtomicU64,
    render_ticks: AtomicU64,
    starved_samples: AtomicU64,
}

impl VoiceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalid_frame(&self) {
        self.invalid_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_evicted(&self, count: u64) {
        self.frames_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn catchup_drop(&self) {
        self.catchup_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn muted_drop(&self) {
        self.muted_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_tick(&self) {
        self.render_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn starved_samples(&self, count: u64) {
        self.starved_samples.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> VoiceStatsSnapshot {
        VoiceStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            invalid_frames: self.invalid_frames.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            catchup_drops: self.catchup_drops.load(Ordering::Relaxed),
            muted_drops: self.muted_drops.load(Ordering::Relaxed),
            render_ticks: self.render_ticks.load(Ordering::Relaxed),
            starved_samples: self.starved_samples.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStatsSnapshot {
    /// Frames accepted from the delivery callback
    pub frames_received: u64,
    /// Zero-length frames dropped at ingestion
    pub invalid_frames: u64,
    /// Frames lost to queue overflow eviction
    pub frames_evicted: u64,
    /// Frames discarded by jitter catch-up
    pub catchup_drops: u64,
    /// Frames dropped because the participant is locally muted
    pub muted_drops: u64,
    /// Render pulls served
    pub render_ticks: u64,
    /// Output samples filled with silence due to starvation
    pub starved_samples: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = VoiceStats::new();
        stats.frame_received();
        stats.frame_received();
        stats.invalid_frame();
        stats.frames_evicted(10);
        stats.catchup_drop();
        stats.render_tick();
        stats.starved_samples(480);

        let snap = stats.snapshot();
        assert_eq!(snap.frames_received, 2);
        assert_eq!(snap.invalid_frames, 1);
        assert_eq!(snap.frames_evicted, 10);
        assert_eq!(snap.catchup_drops, 1);
        assert_eq!(snap.render_ticks, 1);
        assert_eq!(snap.starved_samples, 480);
        assert_eq!(snap.muted_drops, 0);
    }
}
