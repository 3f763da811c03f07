// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::any::Any;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::core::frames::{CaptureId, FrameBuffer, FramePayload, PixelFormat, StreamId};
use crate::core::graph::{CaptureQueue, Node, NodeBase, Port};
use crate::core::pool::{BufferPool, BufferPoolRegistry};
use crate::core::{HalError, Result};

/// Forked buffer as it was at delivery time. Shares the payload with it.
struct ForkSnapshot {
    data: FramePayload,
    width: u32,
    height: u32,
    format: PixelFormat,
    timestamp_ns: u64,
    frame_number: u64,
}

#[derive(Default)]
struct ForkState {
    pending: Option<ForkSnapshot>,
    running: bool,
}

#[derive(Default)]
struct ForkShared {
    state: Mutex<ForkState>,
    ready: Condvar,
}

struct ForkWorker {
    handle: JoinHandle<()>,
    pool: Arc<dyn BufferPool>,
}

/// Duplicates one stream into a second pool.
///
/// The incoming buffer continues unchanged through the output port sharing
/// its pool. A snapshot sharing its bytes is taken on delivery and copied into
/// a buffer from the other output's pool on the fork thread, then sent out
/// there. Writes downstream of the primary path do not reach the snapshot. Only the newest
/// snapshot is kept; a fork that cannot keep up skips frames.
pub struct ForkNode {
    base: NodeBase,
    pools: Arc<BufferPoolRegistry>,
    captures: Arc<CaptureQueue>,
    shared: Arc<ForkShared>,
    worker: Mutex<Option<ForkWorker>>,
}

impl ForkNode {
    pub fn new(name: impl Into<String>, pools: Arc<BufferPoolRegistry>) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|weak: &Weak<ForkNode>| {
            let node_ref: Weak<dyn Node> = weak.clone();
            Self {
                base: NodeBase::new(name, "fork", node_ref),
                pools,
                captures: Arc::new(CaptureQueue::new()),
                shared: Arc::new(ForkShared::default()),
                worker: Mutex::new(None),
            }
        })
    }

    /// The output port whose pool differs from the input's.
    fn fork_port(&self) -> Option<Arc<Port>> {
        let input_pool = self.base.input_ports().first()?.format().pool_id;
        self.base
            .output_ports()
            .into_iter()
            .find(|p| p.format().pool_id != input_pool)
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

fn run_fork_loop(
    name: String,
    shared: Arc<ForkShared>,
    pool: Arc<dyn BufferPool>,
    port: Arc<Port>,
    captures: Arc<CaptureQueue>,
) {
    let stream_id = port.format().stream_id;
    loop {
        let snapshot = {
            let mut state = shared.state.lock();
            loop {
                if !state.running {
                    tracing::debug!("[{}] fork thread exiting", name);
                    return;
                }
                if let Some(snapshot) = state.pending.take() {
                    break snapshot;
                }
                shared.ready.wait(&mut state);
            }
        };

        let Some(mut buffer) = pool.acquire_buffer(None) else {
            if shared.state.lock().running {
                tracing::error!("[{}] fork pool {} returned no buffer", name, pool.id());
            }
            continue;
        };
        if let Err(e) = buffer.copy_from(&snapshot.data) {
            tracing::error!("[{}] fork copy failed: {}", name, e);
            continue;
        }

        buffer.stream_id = stream_id;
        buffer.width = snapshot.width;
        buffer.height = snapshot.height;
        buffer.format = snapshot.format;
        buffer.timestamp_ns = snapshot.timestamp_ns;
        buffer.frame_number = snapshot.frame_number;
        match captures.pop(stream_id) {
            Some(capture_id) => buffer.capture_id = capture_id,
            None => buffer.mark_invalid(),
        }

        if let Err(e) = port.deliver_buffer(buffer) {
            tracing::warn!("[{}] fork delivery failed: {}", name, e);
        }
    }
}

impl Node for ForkNode {
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

        let port = self.fork_port().ok_or_else(|| {
            HalError::GraphError(format!(
                "fork '{}' needs an output port on a second pool",
                self.name()
            ))
        })?;
        let pool_id = port.format().pool_id;
        let pool = self.pools.get(pool_id).ok_or_else(|| {
            HalError::NotFound(format!("fork pool {} is not registered", pool_id))
        })?;

        pool.notify_start();
        self.shared.state.lock().running = true;

        let name = self.name().to_string();
        let shared = Arc::clone(&self.shared);
        let thread_pool = Arc::clone(&pool);
        let captures = Arc::clone(&self.captures);
        let port_name = port.name().to_string();
        let handle = std::thread::Builder::new()
            .name(format!("{}-fork", name))
            .spawn(move || run_fork_loop(name, shared, thread_pool, port, captures))
            .map_err(|e| {
                self.shared.state.lock().running = false;
                HalError::Thread(format!("Failed to spawn fork thread: {}", e))
            })?;

        *worker = Some(ForkWorker { handle, pool });
        tracing::info!("[{}] forking into '{}' (pool {})", self.name(), port_name, pool_id);
        Ok(())
    }

    fn stop(&self, _stream_id: StreamId) -> Result<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        {
            let mut state = self.shared.state.lock();
            state.running = false;
            state.pending = None;
        }
        self.shared.ready.notify_all();
        worker.pool.notify_stop();
        worker
            .handle
            .join()
            .map_err(|_| HalError::Thread(format!("fork thread of '{}' panicked", self.name())))?;
        tracing::info!("[{}] fork stopped", self.name());
        Ok(())
    }

    fn capture(&self, stream_id: StreamId, capture_id: CaptureId) -> Result<()> {
        if self
            .fork_port()
            .is_some_and(|p| p.format().stream_id == stream_id)
        {
            self.captures.push(stream_id, capture_id);
        }
        Ok(())
    }

    fn cancel_capture(&self, stream_id: StreamId) -> Result<()> {
        self.captures.cancel(stream_id);
        Ok(())
    }

    fn deliver_buffer(&self, buffer: FrameBuffer) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.running {
                let replaced = state
                    .pending
                    .replace(ForkSnapshot {
                        data: buffer.shared_data(),
                        width: buffer.width,
                        height: buffer.height,
                        format: buffer.format,
                        timestamp_ns: buffer.timestamp_ns,
                        frame_number: buffer.frame_number,
                    })
                    .is_some();
                if replaced {
                    tracing::trace!("[{}] fork busy, skipped a frame", self.name());
                }
                self.shared.ready.notify_one();
            }
        }
        self.base.forward_buffer(buffer)
    }
}

impl Drop for ForkNode {
    fn drop(&mut self) {
        self.shared.state.lock().running = false;
        self.shared.ready.notify_all();
        if let Some(worker) = self.worker.get_mut().take() {
            worker.pool.notify_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::{link_ports, PortFormat};
    use crate::core::nodes::SinkNode;
    use crate::core::pool::HeapBufferPoolConfig;
    use std::time::{Duration, Instant};

    struct Fixture {
        pools: Arc<BufferPoolRegistry>,
        fork: Arc<ForkNode>,
        primary: Arc<Mutex<Vec<Vec<u8>>>>,
        secondary: Arc<Mutex<Vec<(Vec<u8>, CaptureId)>>>,
        _sinks: (Arc<SinkNode>, Arc<SinkNode>),
        preview_pool: u64,
    }

    fn fixture() -> Fixture {
        let pools = Arc::new(BufferPoolRegistry::new());
        let preview = pools.create_heap_pool(HeapBufferPoolConfig::new(2, 4, 2, PixelFormat::Rgba8888));
        let video = pools.create_heap_pool(HeapBufferPoolConfig::new(2, 4, 2, PixelFormat::Rgba8888));

        let fork = ForkNode::new("fork", Arc::clone(&pools));
        let primary_sink = SinkNode::new("preview");
        let secondary_sink = SinkNode::new("video");

        let primary = Arc::new(Mutex::new(Vec::new()));
        let p = Arc::clone(&primary);
        primary_sink.set_callback(Arc::new(move |mut b: FrameBuffer| {
            p.lock().push(b.data().to_vec());
            b.data_mut().fill(0xff);
        }));
        let secondary = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&secondary);
        secondary_sink.set_callback(Arc::new(move |b: FrameBuffer| {
            s.lock().push((b.data().to_vec(), b.capture_id))
        }));

        let preview_format = PortFormat { stream_id: 0, pool_id: preview.id(), ..Default::default() };
        let video_format = PortFormat { stream_id: 1, pool_id: video.id(), ..Default::default() };
        fork.get_port("in0").set_format(preview_format);

        let out0 = fork.get_port("out0");
        out0.set_format(preview_format);
        let sink_in = primary_sink.get_port("in0");
        sink_in.set_format(preview_format);
        link_ports(&out0, &sink_in);

        let out1 = fork.get_port("out1");
        out1.set_format(video_format);
        let sink_in = secondary_sink.get_port("in0");
        sink_in.set_format(video_format);
        link_ports(&out1, &sink_in);

        Fixture {
            pools,
            fork,
            primary,
            secondary,
            _sinks: (primary_sink, secondary_sink),
            preview_pool: preview.id(),
        }
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
    fn test_fork_copies_bytes_into_second_pool() {
        let fx = fixture();
        fx.fork.capture(1, 42).unwrap();
        fx.fork.start(0).unwrap();

        let pool = fx.pools.get(fx.preview_pool).unwrap();
        let mut buffer = pool.acquire_buffer(None).unwrap();
        let pattern: Vec<u8> = (1..=32).collect();
        buffer.data_mut().copy_from_slice(&pattern);
        let expected = buffer.data().to_vec();
        fx.fork.deliver_buffer(buffer).unwrap();

        assert!(wait_for(|| !fx.secondary.lock().is_empty()));
        fx.fork.stop(0).unwrap();

        assert_eq!(fx.primary.lock()[0], expected);
        let secondary = fx.secondary.lock();
        assert_eq!(secondary[0].0, expected);
        assert_eq!(secondary[0].1, 42);
    }

    #[test]
    fn test_primary_writes_do_not_reach_fork_copy() {
        let fx = fixture();
        fx.fork.capture(1, 7).unwrap();
        fx.fork.start(0).unwrap();

        let pool = fx.pools.get(fx.preview_pool).unwrap();
        let pattern: Vec<u8> = (100..132).collect();
        for _ in 0..3 {
            let mut buffer = pool.acquire_buffer(None).unwrap();
            buffer.data_mut().copy_from_slice(&pattern);
            fx.fork.deliver_buffer(buffer).unwrap();
            assert!(wait_for(|| pool.idle_buffer_count() == 2));
        }

        assert!(wait_for(|| !fx.secondary.lock().is_empty()));
        fx.fork.stop(0).unwrap();

        assert!(fx.secondary.lock().iter().all(|(data, _)| *data == pattern));
        assert!(fx.primary.lock().iter().all(|data| *data == pattern));
    }

    #[test]
    fn test_capture_for_primary_stream_is_ignored() {
        let fx = fixture();
        fx.fork.capture(0, 9).unwrap();
        assert_eq!(fx.fork.captures.len(0), 0);
    }

    #[test]
    fn test_not_running_forwards_only_primary() {
        let fx = fixture();
        fx.fork.deliver_buffer(FrameBuffer::new(0, fx.preview_pool, 32)).unwrap();
        assert_eq!(fx.primary.lock().len(), 1);
        assert!(fx.secondary.lock().is_empty());
    }

    #[test]
    fn test_start_stop_idempotent() {
        let fx = fixture();
        fx.fork.start(0).unwrap();
        fx.fork.start(1).unwrap();
        assert!(fx.fork.is_running());
        fx.fork.stop(0).unwrap();
        fx.fork.stop(1).unwrap();
        assert!(!fx.fork.is_running());
    }

    #[test]
    fn test_start_without_second_pool_fails() {
        let pools = Arc::new(BufferPoolRegistry::new());
        let fork = ForkNode::new("fork", pools);
        let format = PortFormat { pool_id: 1, ..Default::default() };
        fork.get_port("in0").set_format(format);
        fork.get_port("out0").set_format(format);
        assert!(fork.start(0).is_err());
    }
}
