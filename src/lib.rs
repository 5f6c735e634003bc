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

//! Per-participant voice playback core for networked multiplayer sessions.
//!
//! Decoded PCM frames arrive tagged by participant from the session layer's
//! real-time callback; [`VoiceHub`] buffers them per participant behind a
//! bounded drop-oldest [`FrameQueue`], a [`JitterController`] keeps latency in
//! check with catch-up hysteresis, and [`PlaybackRenderer`] serves the audio
//! device's fixed-rate pulls — degrading to silence, never blocking. Rendered
//! audio can optionally pass through a streaming [`PitchShifter`] (an STFT
//! phase vocoder).
//!
//! ```
//! use voiceq::{ParticipantId, VoiceConfig, VoiceHub};
//!
//! let hub = VoiceHub::new(VoiceConfig::default()).unwrap();
//! let alice = ParticipantId::from("alice");
//!
//! // Session-layer delivery callback:
//! hub.on_frame_delivered(&alice, &[0i16; 960]);
//!
//! // Audio-device pull:
//! let mut buffer = [0.0f32; 480];
//! hub.render(&alice, &mut buffer);
//! ```

mod error;
mod frame;
mod hub;
mod jitter;
mod pitch;
mod queue;
mod render;
mod state;
mod stats;

pub use error::{Result, VoiceError};
pub use frame::{ParticipantId, PcmFrame};
pub use hub::{VoiceConfig, VoiceHub};
pub use jitter::{JitterConfig, JitterController};
pub use pitch::{PitchConfig, PitchShifter, MAX_FFT_FRAME};
pub use queue::FrameQueue;
pub use render::PlaybackRenderer;
pub use state::{AudioStatus, ParticipantState, VoiceEvent};
pub use stats::{VoiceStats, VoiceStatsSnapshot};
