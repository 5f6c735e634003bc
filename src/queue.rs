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

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::frame::PcmFrame;

/// Bounded frame queue for one participant.
///
/// Single producer (the delivery callback) and single consumer (the renderer)
/// operate concurrently; each critical section is a constant-time deque
/// operation, so contention at voice frame cadence (one push and a handful of
/// pops per ~20 ms) is negligible.
///
/// Overflow policy: when an insert would exceed `max_frames`, the *oldest*
/// frames are evicted first, preserving the most recent audio.
#[derive(Debug)]
pub struct FrameQueue {
    /// Maximum number of frames retained
    max_frames: usize,
    /// Buffered frames, oldest at the front
    frames: Mutex<VecDeque<PcmFrame>>,
    /// Lock-free mirror of the deque length for control-loop reads
    len: AtomicUsize,
    /// Total frames evicted due to overflow
    evicted: AtomicU64,
}

impl FrameQueue {
    /// Create a new frame queue holding at most `max_frames` frames.
    pub fn new(max_frames: usize) -> Self {
        Self {
            max_frames,
            frames: Mutex::new(VecDeque::with_capacity(max_frames + 1)),
            len: AtomicUsize::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Append a frame at the tail, evicting from the head while over the bound.
    ///
    /// Returns the number of frames evicted.
    pub fn push(&self, frame: PcmFrame) -> usize {
        let mut frames = self.frames.lock();
        frames.push_back(frame);

        let mut evicted = 0;
        while frames.len() > self.max_frames {
            frames.pop_front();
            evicted += 1;
        }
        self.len.store(frames.len(), Ordering::Release);
        drop(frames);

        if evicted > 0 {
            self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
            log::debug!("frame queue overflow: evicted {evicted} oldest frame(s)");
        }
        evicted
    }

    /// Remove and return the oldest frame, if any. Never blocks.
    pub fn pop(&self) -> Option<PcmFrame> {
        let mut frames = self.frames.lock();
        let frame = frames.pop_front();
        self.len.store(frames.len(), Ordering::Release);
        frame
    }

    /// Approximate number of queued frames.
    ///
    /// Lock-free read intended for control-loop decisions, not a transactional
    /// guarantee against a concurrent push or pop.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of frames this queue retains.
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Total frames dropped by overflow eviction since creation.
    pub fn evicted_total(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Discard all buffered frames.
    pub fn clear(&self) {
        let mut frames = self.frames.lock();
        let cleared = frames.len();
        frames.clear();
        self.len.store(0, Ordering::Release);
        drop(frames);

        if cleared > 0 {
            log::debug!("frame queue cleared: purged {cleared} frame(s)");
        }
    }
}
