/**
 * ============================================================================
 * CAPTURE BUFFER MODULE
 * ============================================================================
 *
 * PURPOSE: Ordered, thread-safe hand-off between producers and the finalizer
 *
 * QUEUE BEHAVIOR:
 * - FIFO: producers push, the finalizer drains strictly in push order
 * - Bulk in-place timestamp shift of every unconsumed entry, under the
 *   queue's own lock (used by drift correction); never reorders or drops
 *
 * ============================================================================
 */

use crate::recording::types::{AudioChunk, VideoFrame};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

// Anything carrying a session timestamp
pub trait Timestamped {
    fn timestamp(&self) -> f64;
    fn shift_timestamp(&mut self, delta: f64);
}

impl Timestamped for VideoFrame {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn shift_timestamp(&mut self, delta: f64) {
        self.timestamp += delta;
    }
}

impl Timestamped for AudioChunk {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn shift_timestamp(&mut self, delta: f64) {
        self.timestamp += delta;
    }
}

#[derive(Debug)]
pub struct TimedQueue<T> {
    items: Mutex<VecDeque<T>>,
}

pub type FrameBuffer = TimedQueue<VideoFrame>;
pub type SampleBuffer = TimedQueue<AudioChunk>;

impl<T> Default for TimedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimedQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    // Take everything queued so far, in push order
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<T: Timestamped> TimedQueue<T> {
    // Add `delta` to every unconsumed entry; returns how many were shifted
    pub fn shift_all(&self, delta: f64) -> usize {
        let mut items = self.lock();
        for item in items.iter_mut() {
            item.shift_timestamp(delta);
        }
        items.len()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.lock().back().map(|i| i.timestamp())
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.lock().iter().map(|i| i.timestamp()).collect()
    }
}

impl SampleBuffer {
    // Total sample frames currently queued
    pub fn frame_total(&self) -> u64 {
        self.lock().iter().map(|c| c.frame_count as u64).sum()
    }
}
