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

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::frame::{ParticipantId, PcmFrame};
use crate::jitter::JitterConfig;
use crate::pitch::{PitchConfig, PitchShifter};
use crate::queue::FrameQueue;
use crate::render::PlaybackRenderer;
use crate::state::{AudioStatus, ParticipantState, VoiceEvent};
use crate::stats::{VoiceStats, VoiceStatsSnapshot};
use crate::{Result, VoiceError};

/// Voice pipeline configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Nominal PCM sample rate in Hz
    pub sample_rate: u32,
    /// Per-participant queue bound and catch-up thresholds
    pub jitter: JitterConfig,
    /// Pitch shifting options
    pub pitch: PitchConfig,
    /// Bound on the outbound state-change event queue
    pub max_pending_events: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            jitter: JitterConfig::default(),
            pitch: PitchConfig::default(),
            max_pending_events: 256,
        }
    }
}

/// Queue and state for one tracked participant
#[derive(Debug)]
struct ParticipantHandle {
    queue: Arc<FrameQueue>,
    state: ParticipantState,
}

/// Ingestion point and fan-out for per-participant voice audio.
///
/// Receives raw PCM frame deliveries tagged by participant, routes them into
/// that participant's bounded frame queue, tracks speaking/status/mute state,
/// re-publishes state changes as [`VoiceEvent`]s, and serves device-rate
/// render pulls.
///
/// The hub is an explicitly constructed service object: create one at session
/// start, drop it at session end. Frame delivery and render pulls may run on
/// different real-time threads; every critical section on those paths is a
/// constant-time map or deque operation.
pub struct VoiceHub {
    config: VoiceConfig,
    participants: RwLock<HashMap<ParticipantId, Arc<ParticipantHandle>>>,
    /// Default renderer per participant, for the plain `render` surface.
    /// Additional rendering targets use `create_renderer`.
    renderers: Mutex<HashMap<ParticipantId, PlaybackRenderer>>,
    events: Mutex<VecDeque<VoiceEvent>>,
    stats: Arc<VoiceStats>,
}

impl VoiceHub {
    /// Create a hub, validating the configuration.
    pub fn new(config: VoiceConfig) -> Result<Self> {
        if config.sample_rate == 0 {
            return Err(VoiceError::InvalidSampleRate(config.sample_rate));
        }
        config.jitter.validate()?;
        config.pitch.validate()?;
        if config.max_pending_events == 0 {
            return Err(VoiceError::InvalidConfig(
                "max_pending_events must be nonzero".into(),
            ));
        }

        Ok(Self {
            config,
            participants: RwLock::new(HashMap::new()),
            renderers: Mutex::new(HashMap::new()),
            events: Mutex::new(VecDeque::new()),
            stats: Arc::new(VoiceStats::new()),
        })
    }

    // ---- ingestion surface (session layer callbacks) ----

    /// Deliver one decoded PCM16 frame for a participant.
    ///
    /// The samples are copied immediately; the caller may reuse its buffer as
    /// soon as this returns. Zero-length frames are dropped. Frames for a
    /// locally muted participant are dropped before queuing.
    pub fn on_frame_delivered(&self, participant: &ParticipantId, samples: &[i16]) {
        if samples.is_empty() {
            self.stats.invalid_frame();
            log::debug!("dropping empty frame from {participant}");
            return;
        }

        let handle = self.handle_or_create(participant);
        if handle.state.locally_muted() {
            self.stats.muted_drop();
            log::trace!("dropping frame from locally muted {participant}");
            return;
        }

        let frame = PcmFrame::from_samples(samples, self.config.sample_rate);
        let evicted = handle.queue.push(frame);
        self.stats.frame_received();
        if evicted > 0 {
            self.stats.frames_evicted(evicted as u64);
        }
    }

    /// Participant joined the voice session.
    pub fn on_participant_joined(&self, participant: &ParticipantId) {
        self.handle_or_create(participant);
    }

    /// Participant left: purge all buffered frames and state.
    pub fn on_participant_left(&self, participant: &ParticipantId) {
        let removed = self.participants.write().remove(participant);
        if let Some(handle) = removed {
            handle.queue.clear();
            self.renderers.lock().remove(participant);
            self.push_event(VoiceEvent::Left {
                participant: participant.clone(),
            });
            log::debug!("participant {participant} left, state purged");
        }
    }

    /// Session layer reported an audio capability change.
    pub fn on_participant_status_changed(&self, participant: &ParticipantId, status: AudioStatus) {
        let handle = self.handle_or_create(participant);
        if handle.state.set_status(status) {
            self.push_event(VoiceEvent::StatusChanged {
                participant: participant.clone(),
                status,
            });
        }
    }

    /// Session layer reported a speaking change.
    pub fn on_participant_speaking_changed(&self, participant: &ParticipantId, speaking: bool) {
        let handle = self.handle_or_create(participant);
        if handle.state.set_speaking(speaking) {
            self.push_event(VoiceEvent::SpeakingChanged {
                participant: participant.clone(),
                speaking,
            });
        }
    }

    // ---- consumer surface (UI / gameplay / audio device) ----

    /// Fill `output` with the next device-rate samples for a participant.
    ///
    /// Unknown participants render silence until frames arrive. The default
    /// renderer is created lazily and rebound automatically when the
    /// participant's queue identity changes (leave followed by rejoin).
    pub fn render(&self, participant: &ParticipantId, output: &mut [f32]) {
        let Some(handle) = self.handle(participant) else {
            output.fill(0.0);
            return;
        };

        let mut renderers = self.renderers.lock();
        // Clone the id key only on first render for this participant, not on
        // every device pull.
        if !renderers.contains_key(participant) {
            renderers.insert(
                participant.clone(),
                PlaybackRenderer::new(
                    handle.queue.clone(),
                    self.config.jitter.clone(),
                    self.make_pitch_shifter(),
                    self.stats.clone(),
                ),
            );
        }
        let Some(renderer) = renderers.get_mut(participant) else {
            output.fill(0.0);
            return;
        };
        if !Arc::ptr_eq(renderer.queue(), &handle.queue) {
            renderer.rebind(handle.queue.clone());
        }
        renderer.render(output);
    }

    /// Construct an additional renderer bound to a participant (for example
    /// one per spatialized voice emitter). The participant entry is created
    /// if it does not exist yet.
    pub fn create_renderer(&self, participant: &ParticipantId) -> PlaybackRenderer {
        let handle = self.handle_or_create(participant);
        PlaybackRenderer::new(
            handle.queue.clone(),
            self.config.jitter.clone(),
            self.make_pitch_shifter(),
            self.stats.clone(),
        )
    }

    pub fn is_speaking(&self, participant: &ParticipantId) -> bool {
        self.handle(participant)
            .map(|h| h.state.speaking())
            .unwrap_or(false)
    }

    /// Audio capability status, `None` for unknown participants.
    pub fn audio_status(&self, participant: &ParticipantId) -> Option<AudioStatus> {
        self.handle(participant).map(|h| h.state.status())
    }

    pub fn queued_frame_count(&self, participant: &ParticipantId) -> usize {
        self.handle(participant).map(|h| h.queue.len()).unwrap_or(0)
    }

    pub fn set_participant_locally_muted(&self, participant: &ParticipantId, muted: bool) {
        let handle = self.handle_or_create(participant);
        if handle.state.set_locally_muted(muted) {
            log::debug!("participant {participant} locally muted: {muted}");
        }
    }

    /// Drain pending state-change events in emission order.
    pub fn drain_events(&self) -> Vec<VoiceEvent> {
        self.events.lock().drain(..).collect()
    }

    pub fn stats(&self) -> VoiceStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of tracked participants (diagnostic read).
    pub fn participant_count(&self) -> usize {
        self.participants.read().len()
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    // ---- internals ----

    fn handle(&self, participant: &ParticipantId) -> Option<Arc<ParticipantHandle>> {
        self.participants.read().get(participant).cloned()
    }

    /// Look up a participant, creating the entry on first observed activity.
    fn handle_or_create(&self, participant: &ParticipantId) -> Arc<ParticipantHandle> {
        if let Some(handle) = self.handle(participant) {
            return handle;
        }

        let mut participants = self.participants.write();
        // Re-check under the write lock; a racing caller may have created
        // the entry, and Joined must fire exactly once per entry.
        if let Some(handle) = participants.get(participant) {
            return handle.clone();
        }
        let handle = Arc::new(ParticipantHandle {
            queue: Arc::new(FrameQueue::new(self.config.jitter.max_queue_frames)),
            state: ParticipantState::new(),
        });
        participants.insert(participant.clone(), handle.clone());
        drop(participants);

        self.push_event(VoiceEvent::Joined {
            participant: participant.clone(),
        });
        log::debug!("participant {participant} tracked");
        handle
    }

    fn make_pitch_shifter(&self) -> Option<PitchShifter> {
        if !self.config.pitch.enabled {
            return None;
        }
        match PitchShifter::new(&self.config.pitch, self.config.sample_rate) {
            Ok(shifter) => Some(shifter),
            Err(e) => {
                // Config was validated at construction; keep rendering dry
                // rather than failing the audio callback.
                log::error!("pitch shifter construction failed: {e}");
                None
            }
        }
    }

    fn push_event(&self, event: VoiceEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.config.max_pending_events {
            events.pop_front();
            log::warn!("event queue full, dropping oldest event");
        }
        events.push_back(event);
    }
}
