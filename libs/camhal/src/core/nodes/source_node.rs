// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::binding::HardwareBinding;
use super::port_handler::{PortHandler, RespondQueue};
use crate::core::frames::{
    CameraMetadata, CaptureId, FrameBuffer, FrameCallback, FrameSpec, StreamId,
};
use crate::core::graph::{CaptureQueue, Node, NodeBase, Port, StreamState};
use crate::core::pool::BufferPoolRegistry;
use crate::core::{HalError, Result};

/// A stage that pulls empty buffers from a pool, hands them to its
/// [`HardwareBinding`] and forwards completed buffers downstream.
///
/// Each started stream owns a [`PortHandler`]. Completed buffers are matched
/// against queued capture ids in FIFO order; a buffer that finds no pending
/// request travels on marked invalid.
pub struct SourceNode {
    base: NodeBase,
    self_ref: Weak<SourceNode>,
    binding: Arc<dyn HardwareBinding>,
    pools: Arc<BufferPoolRegistry>,
    handlers: Mutex<HashMap<StreamId, PortHandler>>,
    respond: Mutex<HashMap<StreamId, Arc<RespondQueue>>>,
    states: Mutex<HashMap<StreamId, StreamState>>,
    captures: CaptureQueue,
}

impl SourceNode {
    pub fn new(
        name: impl Into<String>,
        node_type: impl Into<String>,
        binding: Arc<dyn HardwareBinding>,
        pools: Arc<BufferPoolRegistry>,
    ) -> Arc<Self> {
        let name = name.into();
        let node_type = node_type.into();
        Arc::new_cyclic(|weak: &Weak<SourceNode>| {
            let node_ref: Weak<dyn Node> = weak.clone();
            Self {
                base: NodeBase::new(name, node_type, node_ref),
                self_ref: weak.clone(),
                binding,
                pools,
                handlers: Mutex::new(HashMap::new()),
                respond: Mutex::new(HashMap::new()),
                states: Mutex::new(HashMap::new()),
                captures: CaptureQueue::new(),
            }
        })
    }

    pub fn stream_state(&self, stream_id: StreamId) -> StreamState {
        self.states
            .lock()
            .get(&stream_id)
            .copied()
            .unwrap_or_default()
    }

    /// Number of capture ids still waiting for a buffer.
    pub fn pending_captures(&self, stream_id: StreamId) -> usize {
        self.captures.len(stream_id)
    }

    /// Number of completed buffers not yet distributed.
    pub fn pending_completions(&self, stream_id: StreamId) -> usize {
        self.respond
            .lock()
            .get(&stream_id)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    fn set_state(&self, stream_id: StreamId, state: StreamState) {
        self.states.lock().insert(stream_id, state);
    }

    /// Completion path: queue the buffer for the distributor of its stream.
    ///
    /// Runs on whatever thread the hardware completes on. A buffer for a
    /// stream that is not running is dropped, which returns it to its pool.
    fn on_pack_buffer(&self, frame: FrameSpec) {
        let stream_id = frame.buffer.stream_id;
        let queue = self.respond.lock().get(&stream_id).cloned();
        match queue {
            Some(queue) => {
                if let Err(buffer) = queue.push(frame.buffer) {
                    tracing::debug!(
                        "[{}] stream {} draining, reclaiming buffer {}",
                        self.name(),
                        stream_id,
                        buffer.index()
                    );
                }
            }
            None => tracing::debug!(
                "[{}] completion for inactive stream {}, reclaiming buffer {}",
                self.name(),
                stream_id,
                frame.buffer.index()
            ),
        }
    }

    fn completion_callback(&self) -> FrameCallback {
        let weak = self.self_ref.clone();
        Arc::new(move |frame: FrameSpec| {
            if let Some(node) = weak.upgrade() {
                node.on_pack_buffer(frame);
            }
        })
    }

    /// Whether buffers of `stream_id` leave this node in software.
    fn delivers_stream(&self, stream_id: StreamId) -> bool {
        let Some(port) = self.base.output_port_for_stream(stream_id) else {
            return false;
        };
        let downstream_hardware = port
            .peer()
            .and_then(|peer| peer.node())
            .is_some_and(|node| node.is_hardware_backed());
        !(downstream_hardware && self.binding.is_hardware())
    }

    fn node_ref(&self) -> Weak<dyn Node> {
        self.self_ref.clone()
    }

    fn start_threads(&self, handler: &mut PortHandler) -> Result<()> {
        handler.start_distribute_buffers(self.node_ref(), self.name())?;
        handler.start_collect_buffers(self.node_ref(), self.name())
    }

    /// Undo a start that got past the binding: join whatever threads did
    /// come up, drop the respond entry and release the hardware again.
    fn abort_start(&self, mut handler: PortHandler, port: &Arc<Port>) {
        let stream_id = handler.stream_id();
        if let Err(e) = handler.stop_collect_buffers() {
            tracing::warn!("[{}] {}", self.name(), e);
        }
        if let Err(e) = handler.stop_distribute_buffers() {
            tracing::warn!("[{}] {}", self.name(), e);
        }
        self.respond.lock().remove(&stream_id);
        handler.flush_buffers(self);
        if let Err(e) = self.binding.stop(self.name(), stream_id, port) {
            tracing::warn!(
                "[{}] release after failed start of stream {}: {}",
                self.name(),
                stream_id,
                e
            );
        }
        self.states.lock().remove(&stream_id);
    }
}

impl Node for SourceNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_hardware_backed(&self) -> bool {
        self.binding.is_hardware()
    }

    fn init(&self, stream_id: StreamId) -> Result<()> {
        tracing::debug!("[{}] init stream {}", self.name(), stream_id);
        Ok(())
    }

    fn config(&self, stream_id: StreamId, meta: &CameraMetadata) -> Result<()> {
        self.binding.config(self.name(), stream_id, meta)
    }

    fn start(&self, stream_id: StreamId) -> Result<()> {
        let mut handlers = self.handlers.lock();
        match self.stream_state(stream_id) {
            StreamState::Running | StreamState::Wired => {
                tracing::debug!("[{}] stream {} already started", self.name(), stream_id);
                return Ok(());
            }
            StreamState::Draining => {
                // Flushed earlier; resume collection on the existing handler.
                if let Some(handler) = handlers.get_mut(&stream_id) {
                    handler.start_collect_buffers(self.node_ref(), self.name())?;
                    self.set_state(stream_id, StreamState::Running);
                    return Ok(());
                }
            }
            StreamState::Unstarted => {}
        }

        let port = self.base.output_port_for_stream(stream_id).ok_or_else(|| {
            HalError::NotFound(format!(
                "node '{}' has no output port for stream {}",
                self.name(),
                stream_id
            ))
        })?;

        if !self.delivers_stream(stream_id) {
            self.binding
                .start(self.name(), stream_id, &port, self.completion_callback())?;
            self.set_state(stream_id, StreamState::Wired);
            tracing::info!(
                "[{}] stream {} wired in hardware via '{}'",
                self.name(),
                stream_id,
                port.name()
            );
            return Ok(());
        }

        let pool_id = port.format().pool_id;
        let pool = self.pools.get(pool_id).ok_or_else(|| {
            HalError::NotFound(format!(
                "pool {} for '{}.{}' is not registered",
                pool_id,
                self.name(),
                port.name()
            ))
        })?;

        let mut handler = PortHandler::new(stream_id, Arc::clone(&port), pool);
        self.respond.lock().insert(stream_id, handler.respond_queue());

        if let Err(e) = self
            .binding
            .start(self.name(), stream_id, &port, self.completion_callback())
        {
            self.respond.lock().remove(&stream_id);
            return Err(e);
        }

        if let Err(e) = self.start_threads(&mut handler) {
            self.abort_start(handler, &port);
            return Err(e);
        }
        handlers.insert(stream_id, handler);
        self.set_state(stream_id, StreamState::Running);

        tracing::info!(
            "[{}] stream {} started on '{}' (pool {})",
            self.name(),
            stream_id,
            port.name(),
            pool_id
        );
        Ok(())
    }

    fn flush(&self, stream_id: StreamId) -> Result<()> {
        let mut handlers = self.handlers.lock();
        let Some(handler) = handlers.get_mut(&stream_id) else {
            tracing::debug!("[{}] flush of idle stream {}", self.name(), stream_id);
            return Ok(());
        };
        if handler.is_collecting() {
            handler.stop_collect_buffers()?;
            self.set_state(stream_id, StreamState::Draining);
            tracing::debug!("[{}] stream {} flushed", self.name(), stream_id);
        }
        Ok(())
    }

    fn stop(&self, stream_id: StreamId) -> Result<()> {
        let mut handlers = self.handlers.lock();

        if self.stream_state(stream_id) == StreamState::Wired {
            if let Some(port) = self.base.output_port_for_stream(stream_id) {
                self.binding.stop(self.name(), stream_id, &port)?;
            }
            self.states.lock().remove(&stream_id);
            tracing::info!("[{}] wired stream {} stopped", self.name(), stream_id);
            return Ok(());
        }

        let Some(mut handler) = handlers.remove(&stream_id) else {
            tracing::debug!("[{}] stop of idle stream {}", self.name(), stream_id);
            return Ok(());
        };

        handler.stop_collect_buffers()?;
        handler.stop_distribute_buffers()?;
        self.respond.lock().remove(&stream_id);
        let drained = handler.flush_buffers(self);

        if let Some(port) = self.base.output_port_for_stream(stream_id) {
            self.binding.stop(self.name(), stream_id, &port)?;
        }
        self.states.lock().remove(&stream_id);

        tracing::info!(
            "[{}] stream {} stopped ({} buffers drained)",
            self.name(),
            stream_id,
            drained
        );
        Ok(())
    }

    fn capture(&self, stream_id: StreamId, capture_id: CaptureId) -> Result<()> {
        if !self.delivers_stream(stream_id) {
            tracing::trace!(
                "[{}] stream {} not delivered here, capture {} ignored",
                self.name(),
                stream_id,
                capture_id
            );
            return Ok(());
        }
        self.captures.push(stream_id, capture_id);
        Ok(())
    }

    fn cancel_capture(&self, stream_id: StreamId) -> Result<()> {
        let cancelled = self.captures.cancel(stream_id);
        tracing::debug!(
            "[{}] cancelled {} captures on stream {}",
            self.name(),
            cancelled,
            stream_id
        );
        Ok(())
    }

    fn deliver_buffer(&self, mut buffer: FrameBuffer) -> Result<()> {
        match self.captures.pop(buffer.stream_id) {
            Some(capture_id) => buffer.capture_id = capture_id,
            None => {
                tracing::trace!(
                    "[{}] no capture pending on stream {}, buffer {} marked invalid",
                    self.name(),
                    buffer.stream_id,
                    buffer.index()
                );
                buffer.mark_invalid();
            }
        }
        self.base.forward_buffer(buffer)
    }

    fn provide_buffers(&self, frame: FrameSpec) -> Result<()> {
        self.binding.provide_buffers(frame)
    }
}

impl Drop for SourceNode {
    fn drop(&mut self) {
        // Threads hold only weak references; signal them so none stays
        // parked on a pool. Joining here could run on one of those threads.
        for handler in self.handlers.get_mut().values() {
            handler.signal_shutdown();
        }
    }
}

impl std::fmt::Debug for SourceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceNode")
            .field("base", &self.base)
            .field("streams", &self.states.lock().len())
            .finish()
    }
}
