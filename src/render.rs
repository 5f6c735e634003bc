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
use crate::jitter::{JitterConfig, JitterController};
use crate::pitch::PitchShifter;
use crate::queue::FrameQueue;
use crate::stats::VoiceStats;

/// PCM16 full-scale divisor for float normalization
const PCM16_SCALE: f32 = 32768.0;

/// Read position within the frame currently being played out.
///
/// Invariant: `index < frame.len()` whenever `frame` is `Some`.
#[derive(Debug, Default)]
struct PlaybackCursor {
    frame: Option<PcmFrame>,
    index: usize,
}

impl PlaybackCursor {
    /// Next PCM sample, pulling frames from the controller as needed.
    /// Returns `None` only when the queue is exhausted.
    fn next_sample(&mut self, jitter: &mut JitterController) -> Option<i16> {
        loop {
            if let Some(frame) = &self.frame {
                let sample = frame.samples()[self.index];
                self.index += 1;
                if self.index >= frame.len() {
                    self.frame = None;
                    self.index = 0;
                }
                return Some(sample);
            }
            match jitter.next_frame() {
                Some(frame) if !frame.is_empty() => {
                    self.frame = Some(frame);
                    self.index = 0;
                }
                Some(_) => continue,
                None => return None,
            }
        }
    }

    fn clear(&mut self) {
        self.frame = None;
        self.index = 0;
    }
}

/// Pull-based renderer for one participant-rendering target.
///
/// Fills device-rate float buffers from the participant's jitter-controlled
/// frame queue, normalizing PCM16 to [-1, 1) and optionally routing the result
/// through a pitch shifter. Missing audio degrades to silence; `render` never
/// blocks, errors, or emits stale samples.
pub struct PlaybackRenderer {
    jitter: JitterController,
    cursor: PlaybackCursor,
    pitch: Option<PitchShifter>,
    stats: Arc<VoiceStats>,
    /// True after a tick that produced no real audio at all
    starved: bool,
}

impl PlaybackRenderer {
    pub fn new(
        queue: Arc<FrameQueue>,
        jitter_config: JitterConfig,
        pitch: Option<PitchShifter>,
        stats: Arc<VoiceStats>,
    ) -> Self {
        Self {
            jitter: JitterController::new(queue, jitter_config),
            cursor: PlaybackCursor::default(),
            pitch,
            stats,
            starved: false,
        }
    }

    /// Fill `output` with the next samples for this participant.
    ///
    /// Runs the jitter catch-up step once per call, then fills every slot:
    /// silence when the queue runs dry, normalized PCM otherwise. When pitch
    /// shifting is active the whole filled buffer is transformed in place.
    pub fn render(&mut self, output: &mut [f32]) {
        self.stats.render_tick();

        if self.jitter.begin_tick() {
            self.stats.catchup_drop();
        }

        let was_starved = self.starved;
        let mut starved_slots = 0u64;
        let mut produced_audio = false;

        for slot in output.iter_mut() {
            // Zero first so a failed fill can never leave stale data behind.
            *slot = 0.0;
            match self.cursor.next_sample(&mut self.jitter) {
                Some(sample) => {
                    *slot = sample as f32 / PCM16_SCALE;
                    produced_audio = true;
                }
                None => starved_slots += 1,
            }
        }

        if starved_slots > 0 {
            self.stats.starved_samples(starved_slots);
        }
        // A zero-length pull carries no information about the stream; it must
        // not clear a pending starvation.
        if !output.is_empty() {
            self.starved = !produced_audio;
        }

        if let Some(pitch) = &mut self.pitch {
            if produced_audio && was_starved {
                // Stale phase history from before the gap would color the
                // resumed audio.
                pitch.reset();
            }
            if !pitch.is_noop() {
                pitch.process(output);
            }
        }
    }

    /// Bind this renderer to a different participant queue.
    ///
    /// Clears the cursor, catch-up state and pitch-shifter history so nothing
    /// from the previous association leaks into the new stream.
    pub fn rebind(&mut self, queue: Arc<FrameQueue>) {
        self.jitter.rebind(queue);
        self.cursor.clear();
        self.starved = false;
        if let Some(pitch) = &mut self.pitch {
            pitch.reset();
        }
    }

    /// Update the pitch factor, if a shifter is attached.
    pub fn set_pitch_factor(&mut self, factor: f32) {
        if let Some(pitch) = &mut self.pitch {
            pitch.set_factor(factor);
        }
    }

    /// The queue this renderer consumes from.
    pub fn queue(&self) -> &Arc<FrameQueue> {
        self.jitter.queue()
    }

    pub fn is_catching_up(&self) -> bool {
        self.jitter.is_catching_up()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::PitchConfig;

    fn renderer(queue: Arc<FrameQueue>) -> PlaybackRenderer {
        PlaybackRenderer::new(
            queue,
            JitterConfig::default(),
            None,
            Arc::new(VoiceStats::new()),
        )
    }

    #[test]
    fn test_empty_queue_renders_silence() {
        // No frames delivered yet, one 480-sample device pull.
        let queue = Arc::new(FrameQueue::new(100));
        let mut r = renderer(queue.clone());

        let mut out = vec![1.0f32; 480];
        r.render(&mut out);

        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_zero_length_buffer_is_harmless() {
        let queue = Arc::new(FrameQueue::new(100));
        let mut r = renderer(queue);
        let mut out: Vec<f32> = Vec::new();
        r.render(&mut out);
    }

    #[test]
    fn test_pcm16_normalization() {
        let queue = Arc::new(FrameQueue::new(100));
        queue.push(PcmFrame::from_samples(&[i16::MIN, 0, 16384, i16::MAX], 48000));
        let mut r = renderer(queue);

        let mut out = vec![0.0f32; 4];
        r.render(&mut out);

        assert_eq!(out[0], -1.0);
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2], 0.5);
        assert!((out[3] - 32767.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_frame_spans_multiple_ticks() {
        let queue = Arc::new(FrameQueue::new(100));
        let samples: Vec<i16> = (0..960).collect();
        queue.push(PcmFrame::from_samples(&samples, 48000));
        let mut r = renderer(queue);

        let mut first = vec![0.0f32; 480];
        r.render(&mut first);
        let mut second = vec![0.0f32; 480];
        r.render(&mut second);

        assert_eq!(first[0], 0.0);
        assert!((second[0] - 480.0 / 32768.0).abs() < 1e-6);
        assert!((second[479] - 959.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_trailing_slots_silent_after_queue_drains() {
        let queue = Arc::new(FrameQueue::new(100));
        queue.push(PcmFrame::from_samples(&[1000i16; 100], 48000));
        let mut r = renderer(queue);

        let mut out = vec![0.5f32; 480];
        r.render(&mut out);

        assert!((out[99] - 1000.0 / 32768.0).abs() < 1e-6);
        assert!(out[100..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_catchup_applies_once_per_tick() {
        let queue = Arc::new(FrameQueue::new(100));
        for _ in 0..60 {
            queue.push(PcmFrame::from_samples(&[0i16; 480], 48000));
        }
        let mut r = renderer(queue.clone());

        // Depth 60 > trigger 50: the tick drops one frame and plays one.
        let mut out = vec![0.0f32; 480];
        r.render(&mut out);
        assert_eq!(queue.len(), 58);
        assert!(r.is_catching_up());
    }

    #[test]
    fn test_pitch_reset_on_resume_after_starvation() {
        let queue = Arc::new(FrameQueue::new(100));
        let config = PitchConfig {
            enabled: true,
            factor: 1.5,
            ..PitchConfig::default()
        };
        let pitch = PitchShifter::new(&config, 48000).unwrap();
        let mut r = PlaybackRenderer::new(
            queue.clone(),
            JitterConfig::default(),
            Some(pitch),
            Arc::new(VoiceStats::new()),
        );

        // Prime the shifter with audio, then starve it.
        let tone: Vec<i16> = (0..4096).map(|i| ((i % 100) * 300 - 15000) as i16).collect();
        queue.push(PcmFrame::from_samples(&tone, 48000));
        let mut out = vec![0.0f32; 4096];
        r.render(&mut out);

        // Starved tick: slots fill with silence, the shifter drains its tail.
        let mut silent = vec![0.0f32; 480];
        r.render(&mut silent);

        // Resume: the shifter FIFO was cleared, so the first samples out of
        // the transform latency window are silence, not stale history.
        queue.push(PcmFrame::from_samples(&[8000i16; 480], 48000));
        let mut resumed = vec![0.0f32; 480];
        r.render(&mut resumed);
        assert!(resumed.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_empty_pull_keeps_pitch_reset_pending() {
        let queue = Arc::new(FrameQueue::new(100));
        let config = PitchConfig {
            enabled: true,
            factor: 1.5,
            ..PitchConfig::default()
        };
        let pitch = PitchShifter::new(&config, 48000).unwrap();
        let mut r = PlaybackRenderer::new(
            queue.clone(),
            JitterConfig::default(),
            Some(pitch),
            Arc::new(VoiceStats::new()),
        );

        let tone: Vec<i16> = (0..4096).map(|i| ((i % 100) * 300 - 15000) as i16).collect();
        queue.push(PcmFrame::from_samples(&tone, 48000));
        let mut out = vec![0.0f32; 4096];
        r.render(&mut out);

        let mut silent = vec![0.0f32; 480];
        r.render(&mut silent);

        // A zero-length pull between starvation and resumption must not
        // swallow the shifter reset.
        let mut empty: Vec<f32> = Vec::new();
        r.render(&mut empty);

        queue.push(PcmFrame::from_samples(&[8000i16; 480], 48000));
        let mut resumed = vec![0.0f32; 480];
        r.render(&mut resumed);
        assert!(resumed.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_rebind_clears_cursor() {
        let old_queue = Arc::new(FrameQueue::new(100));
        old_queue.push(PcmFrame::from_samples(&[5000i16; 960], 48000));
        let mut r = renderer(old_queue);

        let mut out = vec![0.0f32; 480];
        r.render(&mut out);
        assert!(out[0] != 0.0);

        // Rebind to a fresh queue: cursor must not keep playing the old frame.
        let new_queue = Arc::new(FrameQueue::new(100));
        r.rebind(new_queue);
        r.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
