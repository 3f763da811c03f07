// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::core::frames::{FrameBuffer, StreamId};
use crate::core::graph::{Node, NodeBase};
use crate::core::Result;

/// Consumer of buffers leaving the pipeline.
pub type SinkCallback = Arc<dyn Fn(FrameBuffer) + Send + Sync>;

/// Terminal stage handing every delivered buffer to a callback.
///
/// The buffer returns to its pool once the callback lets go of it.
pub struct SinkNode {
    base: NodeBase,
    callback: RwLock<Option<SinkCallback>>,
    delivered: AtomicU64,
}

impl SinkNode {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|weak: &Weak<SinkNode>| {
            let node_ref: Weak<dyn Node> = weak.clone();
            Self {
                base: NodeBase::new(name, "sink", node_ref),
                callback: RwLock::new(None),
                delivered: AtomicU64::new(0),
            }
        })
    }

    pub fn set_callback(&self, callback: SinkCallback) {
        *self.callback.write() = Some(callback);
    }

    pub fn clear_callback(&self) {
        self.callback.write().take();
    }

    /// Buffers delivered since creation.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Node for SinkNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn start(&self, stream_id: StreamId) -> Result<()> {
        tracing::debug!("[{}] ready for stream {}", self.name(), stream_id);
        Ok(())
    }

    fn deliver_buffer(&self, buffer: FrameBuffer) -> Result<()> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        let callback = self.callback.read().clone();
        match callback {
            Some(callback) => callback(buffer),
            None => tracing::warn!(
                "[{}] no consumer attached, dropping buffer {} of stream {}",
                self.name(),
                buffer.index(),
                buffer.stream_id
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_callback_receives_buffers() {
        let sink = SinkNode::new("preview");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        sink.set_callback(Arc::new(move |buffer: FrameBuffer| {
            seen_clone.lock().push(buffer.index());
        }));

        sink.deliver_buffer(FrameBuffer::new(3, 1, 8)).unwrap();
        sink.deliver_buffers(vec![FrameBuffer::new(4, 1, 8), FrameBuffer::new(5, 1, 8)])
            .unwrap();

        assert_eq!(*seen.lock(), vec![3, 4, 5]);
        assert_eq!(sink.delivered_count(), 3);
    }

    #[test]
    fn test_delivery_without_callback_is_accepted() {
        let sink = SinkNode::new("preview");
        sink.deliver_buffer(FrameBuffer::new(0, 1, 8)).unwrap();
        assert_eq!(sink.delivered_count(), 1);
        assert_eq!(sink.node_type(), "sink");
    }
}
