// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-stream buffer engine of a source stage.
//!
//! The collector thread keeps the hardware supplied with empty buffers; the
//! distributor thread forwards completed buffers downstream in completion
//! order. The two only meet through the [`RespondQueue`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::core::frames::{FrameBuffer, FrameSpec, StreamId};
use crate::core::graph::{Node, Port};
use crate::core::pool::BufferPool;
use crate::core::{HalError, Result};

/// Back-off when a running pool hands out nothing or the hardware refuses a
/// buffer.
const EMPTY_POOL_BACKOFF: Duration = Duration::from_millis(5);

#[derive(Default)]
struct RespondState {
    buffers: VecDeque<FrameBuffer>,
    distributing: bool,
    closed: bool,
}

/// Completed buffers waiting for the distributor.
#[derive(Default)]
pub(crate) struct RespondQueue {
    state: Mutex<RespondState>,
    ready: Condvar,
}

impl RespondQueue {
    /// Append a completed buffer. A closed queue hands the buffer back.
    pub(crate) fn push(&self, buffer: FrameBuffer) -> std::result::Result<(), FrameBuffer> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(buffer);
        }
        state.buffers.push_back(buffer);
        self.ready.notify_one();
        Ok(())
    }

    /// Block until a buffer is available or distribution is switched off.
    fn wait_pop(&self) -> Option<FrameBuffer> {
        let mut state = self.state.lock();
        loop {
            if !state.distributing {
                return None;
            }
            if let Some(buffer) = state.buffers.pop_front() {
                return Some(buffer);
            }
            self.ready.wait(&mut state);
        }
    }

    fn set_distributing(&self, on: bool) {
        self.state.lock().distributing = on;
        self.ready.notify_all();
    }

    /// Refuse further pushes and hand back what is still queued.
    fn close_and_drain(&self) -> VecDeque<FrameBuffer> {
        let mut state = self.state.lock();
        state.closed = true;
        std::mem::take(&mut state.buffers)
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().buffers.len()
    }
}

pub(crate) struct PortHandler {
    stream_id: StreamId,
    port: Arc<Port>,
    pool: Arc<dyn BufferPool>,
    respond: Arc<RespondQueue>,
    collecting: Arc<AtomicBool>,
    collector: Option<JoinHandle<()>>,
    distributor: Option<JoinHandle<()>>,
}

impl PortHandler {
    pub(crate) fn new(stream_id: StreamId, port: Arc<Port>, pool: Arc<dyn BufferPool>) -> Self {
        Self {
            stream_id,
            port,
            pool,
            respond: Arc::new(RespondQueue::default()),
            collecting: Arc::new(AtomicBool::new(false)),
            collector: None,
            distributor: None,
        }
    }

    pub(crate) fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub(crate) fn respond_queue(&self) -> Arc<RespondQueue> {
        Arc::clone(&self.respond)
    }

    pub(crate) fn is_collecting(&self) -> bool {
        self.collector.is_some()
    }

    /// Spawn the collector: acquire, wrap, and provide buffers until told to stop.
    pub(crate) fn start_collect_buffers(&mut self, node: Weak<dyn Node>, node_name: &str) -> Result<()> {
        if self.collector.is_some() {
            return Ok(());
        }
        self.collecting.store(true, Ordering::SeqCst);
        self.pool.notify_start();

        let stream_id = self.stream_id;
        let format = self.port.format();
        let pool = Arc::clone(&self.pool);
        let collecting = Arc::clone(&self.collecting);
        let name = node_name.to_string();

        let handle = std::thread::Builder::new()
            .name(format!("{}-collect-{}", node_name, stream_id))
            .spawn(move || {
                tracing::debug!("[{}] collector running for stream {}", name, stream_id);
                let mut failures = 0u64;
                while collecting.load(Ordering::SeqCst) {
                    let Some(mut buffer) = pool.acquire_buffer(None) else {
                        if collecting.load(Ordering::SeqCst) {
                            std::thread::sleep(EMPTY_POOL_BACKOFF);
                        }
                        continue;
                    };
                    if !collecting.load(Ordering::SeqCst) {
                        break;
                    }
                    buffer.stream_id = stream_id;
                    buffer.width = format.width;
                    buffer.height = format.height;
                    buffer.format = format.format;
                    buffer.usage = format.usage;

                    let Some(node) = node.upgrade() else {
                        break;
                    };
                    let frame = FrameSpec::new(format.pool_id, format.buffer_count, buffer);
                    match node.provide_buffers(frame) {
                        Ok(()) if failures > 0 => {
                            tracing::info!(
                                "[{}] provide_buffers recovered after {} failures",
                                name,
                                failures
                            );
                            failures = 0;
                        }
                        Ok(()) => {}
                        Err(e) => {
                            failures += 1;
                            if failures == 1 {
                                tracing::warn!("[{}] provide_buffers failed: {}", name, e);
                            } else {
                                tracing::trace!("[{}] provide_buffers failed: {}", name, e);
                            }
                            drop(node);
                            if collecting.load(Ordering::SeqCst) {
                                std::thread::sleep(EMPTY_POOL_BACKOFF);
                            }
                        }
                    }
                }
                tracing::debug!("[{}] collector exited for stream {}", name, stream_id);
            })
            .map_err(|e| HalError::Thread(format!("Failed to spawn collector: {}", e)))?;

        self.collector = Some(handle);
        Ok(())
    }

    /// Stop and join the collector. Buffers already inside the hardware
    /// still complete into the respond queue.
    pub(crate) fn stop_collect_buffers(&mut self) -> Result<()> {
        self.collecting.store(false, Ordering::SeqCst);
        self.pool.notify_stop();
        if let Some(handle) = self.collector.take() {
            handle
                .join()
                .map_err(|_| HalError::Thread(format!("collector of stream {} panicked", self.stream_id)))?;
        }
        Ok(())
    }

    /// Spawn the distributor: pop completed buffers and deliver them in order.
    pub(crate) fn start_distribute_buffers(&mut self, node: Weak<dyn Node>, node_name: &str) -> Result<()> {
        if self.distributor.is_some() {
            return Ok(());
        }
        self.respond.set_distributing(true);

        let respond = Arc::clone(&self.respond);
        let stream_id = self.stream_id;
        let name = node_name.to_string();

        let handle = std::thread::Builder::new()
            .name(format!("{}-distribute-{}", node_name, stream_id))
            .spawn(move || {
                while let Some(buffer) = respond.wait_pop() {
                    let Some(node) = node.upgrade() else {
                        break;
                    };
                    if let Err(e) = node.deliver_buffer(buffer) {
                        tracing::warn!("[{}] deliver_buffer failed: {}", name, e);
                    }
                }
                tracing::debug!("[{}] distributor exited for stream {}", name, stream_id);
            })
            .map_err(|e| HalError::Thread(format!("Failed to spawn distributor: {}", e)))?;

        self.distributor = Some(handle);
        Ok(())
    }

    pub(crate) fn stop_distribute_buffers(&mut self) -> Result<()> {
        self.respond.set_distributing(false);
        if let Some(handle) = self.distributor.take() {
            handle
                .join()
                .map_err(|_| HalError::Thread(format!("distributor of stream {} panicked", self.stream_id)))?;
        }
        Ok(())
    }

    /// Close the respond queue and deliver whatever it still holds on the
    /// calling thread.
    pub(crate) fn flush_buffers(&self, node: &dyn Node) -> usize {
        let remaining = self.respond.close_and_drain();
        let count = remaining.len();
        for buffer in remaining {
            if let Err(e) = node.deliver_buffer(buffer) {
                tracing::warn!("[{}] deliver_buffer during drain failed: {}", node.name(), e);
            }
        }
        count
    }

    /// Signal both threads to exit without waiting for them.
    pub(crate) fn signal_shutdown(&self) {
        self.collecting.store(false, Ordering::SeqCst);
        self.pool.notify_stop();
        self.respond.set_distributing(false);
        self.respond.close_and_drain();
    }
}
