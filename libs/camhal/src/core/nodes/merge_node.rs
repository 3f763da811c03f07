// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::core::frames::{FrameBuffer, StreamId};
use crate::core::graph::{Node, NodeBase, Port};
use crate::core::{HalError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Upper bound on buffers waiting to be paired. When reached, the oldest
    /// buffer from the incoming buffer's pool is dropped. Unbounded if unset.
    #[serde(default)]
    pub max_pending: Option<usize>,
}

#[derive(Default)]
struct MergeState {
    pending: VecDeque<FrameBuffer>,
    running: bool,
}

#[derive(Default)]
struct MergeShared {
    state: Mutex<MergeState>,
    ready: Condvar,
}

/// Pairs buffers arriving from two different pools and sends each pair
/// downstream as one delivery.
///
/// A pair is the oldest pending buffer plus the oldest pending buffer from
/// any other pool. Two buffers from the same pool never form a pair.
pub struct MergeNode {
    base: NodeBase,
    config: MergeConfig,
    shared: Arc<MergeShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MergeNode {
    pub fn new(name: impl Into<String>, config: MergeConfig) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|weak: &Weak<MergeNode>| {
            let node_ref: Weak<dyn Node> = weak.clone();
            Self {
                base: NodeBase::new(name, "merge", node_ref),
                config,
                shared: Arc::new(MergeShared::default()),
                worker: Mutex::new(None),
            }
        })
    }

    /// Buffers waiting for a partner.
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    fn enqueue(&self, state: &mut MergeState, buffer: FrameBuffer) {
        if let Some(max) = self.config.max_pending {
            if state.pending.len() >= max {
                let victim = state
                    .pending
                    .iter()
                    .position(|b| b.pool_id() == buffer.pool_id())
                    .unwrap_or(0);
                if let Some(dropped) = state.pending.remove(victim) {
                    tracing::warn!(
                        "[{}] merge backlog full, dropping buffer {} of pool {}",
                        self.name(),
                        dropped.index(),
                        dropped.pool_id()
                    );
                }
            }
        }
        state.pending.push_back(buffer);
    }
}

fn run_merge_loop(name: String, shared: Arc<MergeShared>, out: Arc<Port>) {
    'merge: loop {
        let mut staged: Vec<FrameBuffer> = Vec::with_capacity(2);
        while staged.len() < 2 {
            let mut state = shared.state.lock();
            let next = loop {
                if !state.running {
                    break 'merge;
                }
                let position = match staged.first() {
                    None if !state.pending.is_empty() => Some(0),
                    None => None,
                    Some(first) => state
                        .pending
                        .iter()
                        .position(|b| b.pool_id() != first.pool_id()),
                };
                if let Some(position) = position {
                    break state.pending.remove(position);
                }
                shared.ready.wait(&mut state);
            };
            drop(state);
            staged.extend(next);
        }

        tracing::trace!(
            "[{}] merged pools {} + {}",
            name,
            staged[0].pool_id(),
            staged[1].pool_id()
        );
        if let Err(e) = out.deliver_buffers(staged) {
            tracing::warn!("[{}] merged delivery failed: {}", name, e);
        }
    }
    tracing::debug!("[{}] merge thread exiting", name);
}

impl Node for MergeNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn start(&self, _stream_id: StreamId) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        let out = self
            .base
            .output_ports()
            .into_iter()
            .next()
            .ok_or_else(|| HalError::GraphError(format!("merge '{}' has no output port", self.name())))?;

        self.shared.state.lock().running = true;
        let name = self.name().to_string();
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(format!("{}-merge", name))
            .spawn(move || run_merge_loop(name, shared, out))
            .map_err(|e| {
                self.shared.state.lock().running = false;
                HalError::Thread(format!("Failed to spawn merge thread: {}", e))
            })?;
        *worker = Some(handle);
        tracing::info!("[{}] merge started", self.name());
        Ok(())
    }

    fn stop(&self, _stream_id: StreamId) -> Result<()> {
        let Some(handle) = self.worker.lock().take() else {
            return Ok(());
        };
        self.shared.state.lock().running = false;
        self.shared.ready.notify_all();
        handle
            .join()
            .map_err(|_| HalError::Thread(format!("merge thread of '{}' panicked", self.name())))?;

        let unpaired = std::mem::take(&mut self.shared.state.lock().pending);
        tracing::info!("[{}] merge stopped ({} unpaired)", self.name(), unpaired.len());
        Ok(())
    }

    fn deliver_buffer(&self, buffer: FrameBuffer) -> Result<()> {
        let mut state = self.shared.state.lock();
        self.enqueue(&mut state, buffer);
        self.shared.ready.notify_one();
        Ok(())
    }

    fn deliver_buffers(&self, buffers: Vec<FrameBuffer>) -> Result<()> {
        let mut state = self.shared.state.lock();
        for buffer in buffers {
            self.enqueue(&mut state, buffer);
        }
        self.shared.ready.notify_one();
        Ok(())
    }
}

impl Drop for MergeNode {
    fn drop(&mut self) {
        self.shared.state.lock().running = false;
        self.shared.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frames::PoolId;
    use crate::core::graph::link_ports;
    use crate::core::nodes::SinkNode;
    use std::time::{Duration, Instant};

    fn merge_to_sink(config: MergeConfig) -> (Arc<MergeNode>, Arc<SinkNode>, Arc<Mutex<Vec<PoolId>>>) {
        let merge = MergeNode::new("merge", config);
        let sink = SinkNode::new("sink");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        sink.set_callback(Arc::new(move |b: FrameBuffer| seen_clone.lock().push(b.pool_id())));
        merge.get_port("in0");
        merge.get_port("in1");
        link_ports(&merge.get_port("out0"), &sink.get_port("in0"));
        (merge, sink, seen)
    }

    fn wait_for(f: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_pairs_across_pools_only() {
        let (merge, _sink, seen) = merge_to_sink(MergeConfig::default());
        merge.start(0).unwrap();

        merge.deliver_buffer(FrameBuffer::new(0, 1, 1)).unwrap();
        merge.deliver_buffer(FrameBuffer::new(1, 1, 1)).unwrap();
        merge.deliver_buffer(FrameBuffer::new(0, 2, 1)).unwrap();

        assert!(wait_for(|| seen.lock().len() == 2));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(merge.pending_len(), 1);

        merge.stop(0).unwrap();
        assert_eq!(merge.pending_len(), 0);
    }

    #[test]
    fn test_same_pool_never_pairs() {
        let (merge, _sink, seen) = merge_to_sink(MergeConfig::default());
        merge.start(0).unwrap();
        for i in 0..4 {
            merge.deliver_buffer(FrameBuffer::new(i, 7, 1)).unwrap();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(seen.lock().is_empty());
        merge.stop(0).unwrap();
    }

    #[test]
    fn test_max_pending_drops_oldest_of_same_pool() {
        let (merge, _sink, _seen) = merge_to_sink(MergeConfig { max_pending: Some(2) });
        merge.deliver_buffer(FrameBuffer::new(0, 1, 1)).unwrap();
        merge.deliver_buffer(FrameBuffer::new(1, 1, 1)).unwrap();
        merge.deliver_buffer(FrameBuffer::new(2, 1, 1)).unwrap();

        let state = merge.shared.state.lock();
        let indices: Vec<u32> = state.pending.iter().map(|b| b.index()).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn test_start_requires_output_port() {
        let merge = MergeNode::new("merge", MergeConfig::default());
        merge.get_port("in0");
        assert!(merge.start(0).is_err());
    }
}
