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

use std::sync::Arc;

use crate::frame::PcmFrame;
use crate::queue::FrameQueue;
use crate::{Result, VoiceError};

/// Jitter catch-up configuration
///
/// At 48 kHz mono with ~20 ms frames the defaults bound worst-case latency to
/// roughly one second, collapsing toward ~0.4 s while catch-up is engaged.
#[derive(Debug, Clone)]
pub struct JitterConfig {
    /// Maximum number of frames retained per participant
    pub max_queue_frames: usize,
    /// Queue depth above which catch-up engages
    pub catchup_threshold: usize,
    /// Queue depth at or below which catch-up disengages
    pub catchup_stop_threshold: usize,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            max_queue_frames: 100,
            catchup_threshold: 50,
            catchup_stop_threshold: 20,
        }
    }
}

impl JitterConfig {
    /// Validate threshold ordering: stop < trigger <= max.
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_frames == 0
            || self.catchup_stop_threshold >= self.catchup_threshold
            || self.catchup_threshold > self.max_queue_frames
        {
            return Err(VoiceError::InvalidJitterThresholds {
                stop: self.catchup_stop_threshold,
                trigger: self.catchup_threshold,
                max: self.max_queue_frames,
            });
        }
        Ok(())
    }
}

/// Consumer-side catch-up controller over one participant's frame queue.
///
/// Bounds end-to-end latency by dropping one buffered frame per render tick
/// while engaged. Hysteresis between the trigger and stop thresholds keeps the
/// controller from oscillating when the depth hovers near the trigger.
#[derive(Debug)]
pub struct JitterController {
    queue: Arc<FrameQueue>,
    config: JitterConfig,
    /// Engaged until depth falls to or below the stop threshold.
    /// Consumer-side state only; the producer never reads it.
    catching_up: bool,
    /// Frames discarded by catch-up since creation
    dropped: u64,
}

impl JitterController {
    pub fn new(queue: Arc<FrameQueue>, config: JitterConfig) -> Self {
        Self {
            queue,
            config,
            catching_up: false,
            dropped: 0,
        }
    }

    /// Run the catch-up step. Called once per render tick, before the normal
    /// dequeue path.
    ///
    /// Returns true if a frame was discarded this tick.
    pub fn begin_tick(&mut self) -> bool {
        let mut discarded = false;

        if self.queue.len() > self.config.catchup_threshold || self.catching_up {
            if !self.catching_up {
                log::debug!(
                    "catch-up engaged at depth {} (trigger {})",
                    self.queue.len(),
                    self.config.catchup_threshold
                );
            }
            self.catching_up = true;
            // Best effort; the queue may already be empty.
            if self.queue.pop().is_some() {
                self.dropped += 1;
                discarded = true;
            }

            // Disengage against the lower threshold, not the trigger, so
            // depths hovering near the trigger cannot thrash the controller.
            self.catching_up = self.queue.len() > self.config.catchup_stop_threshold;
            if !self.catching_up {
                log::debug!(
                    "catch-up disengaged at depth {} (stop {})",
                    self.queue.len(),
                    self.config.catchup_stop_threshold
                );
            }
        }

        discarded
    }

    /// Dequeue the next frame for playback.
    pub fn next_frame(&mut self) -> Option<PcmFrame> {
        self.queue.pop()
    }

    /// Whether catch-up is currently engaged.
    pub fn is_catching_up(&self) -> bool {
        self.catching_up
    }

    /// Frames discarded by catch-up since creation.
    pub fn dropped_total(&self) -> u64 {
        self.dropped
    }

    /// The queue this controller consumes from.
    pub fn queue(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    /// Swap the underlying queue (participant rebind) and clear catch-up state.
    pub fn rebind(&mut self, queue: Arc<FrameQueue>) {
        self.queue = queue;
        self.catching_up = false;
    }
}
