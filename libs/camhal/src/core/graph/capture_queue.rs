// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::core::frames::{CaptureId, StreamId};

/// Pending capture requests, one FIFO per stream.
///
/// Ids are handed out first-queued-first-delivered; there is no matching by
/// content.
#[derive(Default)]
pub struct CaptureQueue {
    pending: Mutex<HashMap<StreamId, VecDeque<CaptureId>>>,
}

impl CaptureQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, stream_id: StreamId, capture_id: CaptureId) {
        self.pending
            .lock()
            .entry(stream_id)
            .or_default()
            .push_back(capture_id);
    }

    /// Take the oldest pending id for `stream_id`.
    pub fn pop(&self, stream_id: StreamId) -> Option<CaptureId> {
        self.pending.lock().get_mut(&stream_id)?.pop_front()
    }

    /// Drop every pending id of `stream_id`, returning how many were dropped.
    pub fn cancel(&self, stream_id: StreamId) -> usize {
        self.pending
            .lock()
            .remove(&stream_id)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    pub fn len(&self, stream_id: StreamId) -> usize {
        self.pending
            .lock()
            .get(&stream_id)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, stream_id: StreamId) -> bool {
        self.len(stream_id) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_per_stream() {
        let queue = CaptureQueue::new();
        queue.push(0, 5);
        queue.push(1, 100);
        queue.push(0, 7);

        assert_eq!(queue.pop(0), Some(5));
        assert_eq!(queue.pop(1), Some(100));
        assert_eq!(queue.pop(0), Some(7));
        assert_eq!(queue.pop(0), None);
    }

    #[test]
    fn test_cancel() {
        let queue = CaptureQueue::new();
        queue.push(2, 1);
        queue.push(2, 2);
        assert_eq!(queue.cancel(2), 2);
        assert!(queue.is_empty(2));
        assert_eq!(queue.cancel(2), 0);
    }
}
