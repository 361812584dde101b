//! Bounded video frame queue
//!
//! Single mutex around a `VecDeque`, producer never blocks: pushing into a
//! full queue evicts the oldest frame, keeping the N most recent. The drop
//! counters feed the session's stats.

use crate::media::VideoFrame;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Drop and occupancy counters for a [`FrameQueue`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub len: usize,
    /// Frames evicted because the queue was full
    pub dropped_overflow: u64,
    /// Frames discarded by the consumer for arriving too late
    pub dropped_late: u64,
}

impl QueueStats {
    pub fn total_dropped(&self) -> u64 {
        self.dropped_overflow + self.dropped_late
    }
}

/// Thread-safe FIFO of decoded frames with a hard capacity
pub struct FrameQueue {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    frames: VecDeque<VideoFrame>,
    dropped_overflow: u64,
    dropped_late: u64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                dropped_overflow: 0,
                dropped_late: 0,
            }),
            capacity,
        }
    }

    /// Enqueue a frame, evicting the oldest when full
    pub fn push(&self, frame: VideoFrame) {
        let mut inner = self.inner.lock();
        if inner.frames.len() == self.capacity {
            inner.frames.pop_front();
            inner.dropped_overflow += 1;
        }
        inner.frames.push_back(frame);
    }

    pub fn pop(&self) -> Option<VideoFrame> {
        self.inner.lock().frames.pop_front()
    }

    /// Presentation time of the next frame without removing it
    pub fn peek_pts(&self) -> Option<f64> {
        self.inner.lock().frames.front().map(|f| f.pts_secs)
    }

    pub fn clear(&self) {
        self.inner.lock().frames.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a frame the consumer popped but refused to present
    pub fn note_late_drop(&self) {
        self.inner.lock().dropped_late += 1;
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            len: inner.frames.len(),
            dropped_overflow: inner.dropped_overflow,
            dropped_late: inner.dropped_late,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_frame(pts_secs: f64) -> VideoFrame {
        VideoFrame {
            data: vec![0; 4],
            width: 1,
            height: 1,
            pts_secs,
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new(4);
        queue.push(test_frame(0.0));
        queue.push(test_frame(1.0));
        queue.push(test_frame(2.0));
        assert_eq!(queue.peek_pts(), Some(0.0));
        assert_eq!(queue.pop().unwrap().pts_secs, 0.0);
        assert_eq!(queue.pop().unwrap().pts_secs, 1.0);
        assert_eq!(queue.pop().unwrap().pts_secs, 2.0);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let queue = FrameQueue::new(12);
        for i in 0..20 {
            queue.push(test_frame(i as f64));
        }
        assert_eq!(queue.len(), 12);
        assert_eq!(queue.stats().dropped_overflow, 8);
        // Frames 0..8 were evicted; 8..20 remain in order
        assert_eq!(queue.peek_pts(), Some(8.0));
    }

    #[test]
    fn test_clear_keeps_counters() {
        let queue = FrameQueue::new(2);
        queue.push(test_frame(0.0));
        queue.push(test_frame(1.0));
        queue.push(test_frame(2.0));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.stats().dropped_overflow, 1);
    }

    #[test]
    fn test_late_drop_counter() {
        let queue = FrameQueue::new(2);
        queue.note_late_drop();
        queue.note_late_drop();
        let stats = queue.stats();
        assert_eq!(stats.dropped_late, 2);
        assert_eq!(stats.total_dropped(), 2);
    }

    #[test]
    fn test_minimum_capacity() {
        let queue = FrameQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(test_frame(0.0));
        queue.push(test_frame(1.0));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek_pts(), Some(1.0));
    }

    proptest! {
        #[test]
        fn prop_bounded_and_most_recent(
            pts in proptest::collection::vec(0.0f64..100.0, 0..40),
            capacity in 1usize..16,
        ) {
            let queue = FrameQueue::new(capacity);
            for p in &pts {
                queue.push(test_frame(*p));
            }
            prop_assert!(queue.len() <= capacity);

            let expected: Vec<f64> = pts
                .iter()
                .copied()
                .skip(pts.len().saturating_sub(capacity))
                .collect();
            let mut drained = Vec::new();
            while let Some(frame) = queue.pop() {
                drained.push(frame.pts_secs);
            }
            prop_assert_eq!(drained, expected);
        }
    }
}
