// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The hardware half of a source stage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::frames::{CameraMetadata, FrameCallback, FrameSpec, StreamId};
use crate::core::graph::Port;
use crate::core::{HalError, Result};

/// What a [`SourceNode`](super::SourceNode) drives: something that accepts
/// empty buffers and later reports them filled through a callback.
pub trait HardwareBinding: Send + Sync {
    /// Whether the binding is a physical hardware block. Two hardware-backed
    /// neighbours exchange frames inside the hardware.
    fn is_hardware(&self) -> bool;

    /// Bring the block up for `stream_id` on `port` and install `on_buffer`
    /// as its completion callback.
    fn start(
        &self,
        node: &str,
        stream_id: StreamId,
        port: &Arc<Port>,
        on_buffer: FrameCallback,
    ) -> Result<()>;

    /// Tear down what [`HardwareBinding::start`] set up.
    fn stop(&self, node: &str, stream_id: StreamId, port: &Arc<Port>) -> Result<()>;

    fn config(&self, _node: &str, _stream_id: StreamId, _meta: &CameraMetadata) -> Result<()> {
        Ok(())
    }

    /// Hand one empty buffer to the block.
    fn provide_buffers(&self, frame: FrameSpec) -> Result<()>;
}

/// Software source that completes every provided buffer immediately.
///
/// With an interval set, each completion is delayed to pace the stream.
pub struct LoopbackBinding {
    interval: Option<Duration>,
    callback: Mutex<Option<FrameCallback>>,
    frame_counter: AtomicU64,
    epoch: Instant,
}

impl Default for LoopbackBinding {
    fn default() -> Self {
        Self::new(None)
    }
}

impl LoopbackBinding {
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            callback: Mutex::new(None),
            frame_counter: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Number of buffers completed so far.
    pub fn frames_completed(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }
}

impl HardwareBinding for LoopbackBinding {
    fn is_hardware(&self) -> bool {
        false
    }

    fn start(
        &self,
        node: &str,
        stream_id: StreamId,
        _port: &Arc<Port>,
        on_buffer: FrameCallback,
    ) -> Result<()> {
        tracing::debug!("[{}] loopback source armed for stream {}", node, stream_id);
        *self.callback.lock() = Some(on_buffer);
        Ok(())
    }

    fn stop(&self, node: &str, stream_id: StreamId, _port: &Arc<Port>) -> Result<()> {
        tracing::debug!("[{}] loopback source disarmed for stream {}", node, stream_id);
        self.callback.lock().take();
        Ok(())
    }

    fn provide_buffers(&self, mut frame: FrameSpec) -> Result<()> {
        if let Some(interval) = self.interval {
            std::thread::sleep(interval);
        }
        let callback = self
            .callback
            .lock()
            .clone()
            .ok_or_else(|| HalError::Hardware("loopback source is not started".into()))?;

        frame.buffer.frame_number = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        frame.buffer.timestamp_ns = self.epoch.elapsed().as_nanos() as u64;
        callback(frame);
        Ok(())
    }
}
