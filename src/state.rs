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

//! Per-participant audio state tracking

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::frame::ParticipantId;

/// Audio capability status reported by the session layer for a participant.
///
/// An unknown/not-yet-joined participant is modeled as absence of state, not
/// as a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioStatus {
    Disabled,
    Enabled,
    Unsupported,
}

impl AudioStatus {
    fn to_u8(self) -> u8 {
        match self {
            AudioStatus::Disabled => 0,
            AudioStatus::Enabled => 1,
            AudioStatus::Unsupported => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => AudioStatus::Disabled,
            2 => AudioStatus::Unsupported,
            _ => AudioStatus::Enabled,
        }
    }
}

/// State change notifications re-published to UI/gameplay consumers.
///
/// Emitted only when a tracked value actually changes; repeated identical
/// updates produce no event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceEvent {
    Joined {
        participant: ParticipantId,
    },
    Left {
        participant: ParticipantId,
    },
    SpeakingChanged {
        participant: ParticipantId,
        speaking: bool,
    },
    StatusChanged {
        participant: ParticipantId,
        status: AudioStatus,
    },
}

/// Speaking/status/mute flags for one participant.
///
/// All fields are atomics so the UI and gameplay threads can read them without
/// touching the ingestion path's locks.
#[derive(Debug)]
pub struct ParticipantState {
    speaking: AtomicBool,
    status: AtomicU8,
    locally_muted: AtomicBool,
}

impl ParticipantState {
    /// New entry with the join defaults: enabled, not speaking, not muted.
    pub fn new() -> Self {
        Self {
            speaking: AtomicBool::new(false),
            status: AtomicU8::new(AudioStatus::Enabled.to_u8()),
            locally_muted: AtomicBool::new(false),
        }
    }

    pub fn speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }

    /// Update the speaking flag; returns true when the value changed.
    pub fn set_speaking(&self, speaking: bool) -> bool {
        self.speaking.swap(speaking, Ordering::Relaxed) != speaking
    }

    pub fn status(&self) -> AudioStatus {
        AudioStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    /// Update the audio status; returns true when the value changed.
    pub fn set_status(&self, status: AudioStatus) -> bool {
        self.status.swap(status.to_u8(), Ordering::Relaxed) != status.to_u8()
    }

    pub fn locally_muted(&self) -> bool {
        self.locally_muted.load(Ordering::Relaxed)
    }

    /// Update the local mute flag; returns true when the value changed.
    pub fn set_locally_muted(&self, muted: bool) -> bool {
        self.locally_muted.swap(muted, Ordering::Relaxed) != muted
    }
}

impl Default for ParticipantState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_defaults() {
        let state = ParticipantState::new();
        assert!(!state.speaking());
        assert_eq!(state.status(), AudioStatus::Enabled);
        assert!(!state.locally_muted());
    }

    #[test]
    fn test_setters_report_change_only_once() {
        let state = ParticipantState::new();

        assert!(state.set_speaking(true));
        assert!(!state.set_speaking(true));
        assert!(state.set_speaking(false));

        assert!(state.set_status(AudioStatus::Disabled));
        assert!(!state.set_status(AudioStatus::Disabled));
        assert!(state.set_status(AudioStatus::Unsupported));

        assert!(state.set_locally_muted(true));
        assert!(!state.set_locally_muted(true));
    }

    #[test]
    fn test_status_round_trip() {
        let state = ParticipantState::new();
        for status in [
            AudioStatus::Disabled,
            AudioStatus::Enabled,
            AudioStatus::Unsupported,
        ] {
            state.set_status(status);
            assert_eq!(state.status(), status);
        }
    }
}
