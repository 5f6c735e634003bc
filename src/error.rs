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

use thiserror::Error;

/// Result type for voiceq operations
pub type Result<T> = std::result::Result<T, VoiceError>;

/// Errors that can occur in voiceq operations
///
/// Only configuration problems surface as errors. Runtime data-availability
/// conditions (empty queue, overrun, malformed frame) degrade to silence or
/// dropped data instead of failing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoiceError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Invalid FFT frame size: {0} (must be a power of two <= {1})")]
    InvalidFftFrameSize(usize, usize),

    #[error("Invalid jitter thresholds: stop={stop} trigger={trigger} max={max}")]
    InvalidJitterThresholds {
        stop: usize,
        trigger: usize,
        max: usize,
    },
}
