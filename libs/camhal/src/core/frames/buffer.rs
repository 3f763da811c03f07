// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Frame buffers that flow between pipeline nodes.
//!
//! A [`FrameBuffer`] is owned by exactly one stage at a time and moves along
//! the graph by value. Buffers issued by a pool remember their pool through a
//! [`BufferRecycler`] and hand their storage back when dropped, so a buffer
//! that is discarded anywhere in the graph is reclaimed rather than leaked.
//!
//! The payload is a [`FramePayload`]: snapshots taken with
//! [`FrameBuffer::shared_data`] share it without copying, and the first write
//! through [`FrameBuffer::data_mut`] while a snapshot is alive copies it.

use std::sync::{Arc, Weak};

use super::PixelFormat;
use crate::core::{HalError, Result};

/// Identifier scoping a logical data flow (preview, video, still capture).
pub type StreamId = i32;

/// Identifier of one frame request within a stream.
pub type CaptureId = i32;

/// Identifier of a buffer pool.
pub type PoolId = u64;

/// Shared, copy-on-write storage of a frame.
pub type FramePayload = Arc<Vec<u8>>;

/// Capture id carried by buffers that were not matched to a request.
pub const INVALID_CAPTURE_ID: CaptureId = -1;

/// Delivery status of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferStatus {
    /// Buffer carries a frame for a pending capture request.
    #[default]
    Ok,
    /// Buffer was delivered without a matching capture request (dropped).
    Invalid,
}

/// Receives the storage of a pooled buffer when the buffer is dropped.
pub trait BufferRecycler: Send + Sync {
    fn recycle(&self, index: u32, data: FramePayload);
}

/// One frame of image data plus the bookkeeping the pipeline attaches to it.
pub struct FrameBuffer {
    index: u32,
    pool_id: PoolId,
    data: FramePayload,
    recycler: Option<Weak<dyn BufferRecycler>>,

    pub stream_id: StreamId,
    pub capture_id: CaptureId,
    pub status: BufferStatus,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub usage: u64,
    pub timestamp_ns: u64,
    pub frame_number: u64,
}

impl FrameBuffer {
    /// Create a detached buffer that is not reclaimed by any pool.
    pub fn new(index: u32, pool_id: PoolId, size: usize) -> Self {
        Self::from_parts(index, pool_id, Arc::new(vec![0; size]), None)
    }

    /// Create a buffer whose storage goes back to `recycler` on drop.
    pub fn pooled(
        index: u32,
        pool_id: PoolId,
        data: FramePayload,
        recycler: Weak<dyn BufferRecycler>,
    ) -> Self {
        Self::from_parts(index, pool_id, data, Some(recycler))
    }

    fn from_parts(
        index: u32,
        pool_id: PoolId,
        data: FramePayload,
        recycler: Option<Weak<dyn BufferRecycler>>,
    ) -> Self {
        Self {
            index,
            pool_id,
            data,
            recycler,
            stream_id: 0,
            capture_id: INVALID_CAPTURE_ID,
            status: BufferStatus::Ok,
            width: 0,
            height: 0,
            format: PixelFormat::default(),
            usage: 0,
            timestamp_ns: 0,
            frame_number: 0,
        }
    }

    /// Slot index inside the issuing pool.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Id of the pool this buffer belongs to.
    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    /// Capacity of the payload in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Writable payload. Copies it first if a snapshot still shares it.
    pub fn data_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// The payload as it is now, without copying.
    pub fn shared_data(&self) -> FramePayload {
        Arc::clone(&self.data)
    }

    pub fn is_valid(&self) -> bool {
        self.status == BufferStatus::Ok
    }

    /// Mark the buffer as delivered without a matching capture request.
    pub fn mark_invalid(&mut self) {
        self.status = BufferStatus::Invalid;
        self.capture_id = INVALID_CAPTURE_ID;
    }

    /// Copy `src` into the start of the payload.
    ///
    /// Fails without touching the payload when `src` does not fit.
    pub fn copy_from(&mut self, src: &[u8]) -> Result<()> {
        if src.len() > self.data.len() {
            return Err(HalError::BufferError(format!(
                "copy of {} bytes exceeds buffer {} of pool {} ({} bytes)",
                src.len(),
                self.index,
                self.pool_id,
                self.data.len()
            )));
        }
        self.data_mut()[..src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Clear per-frame bookkeeping before the buffer is reissued.
    pub(crate) fn reset(&mut self) {
        self.stream_id = 0;
        self.capture_id = INVALID_CAPTURE_ID;
        self.status = BufferStatus::Ok;
        self.timestamp_ns = 0;
        self.frame_number = 0;
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        if let Some(recycler) = self.recycler.take().and_then(|weak| weak.upgrade()) {
            recycler.recycle(self.index, std::mem::take(&mut self.data));
        }
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("index", &self.index)
            .field("pool_id", &self.pool_id)
            .field("size", &self.data.len())
            .field("stream_id", &self.stream_id)
            .field("capture_id", &self.capture_id)
            .field("status", &self.status)
            .field("frame_number", &self.frame_number)
            .finish()
    }
}

/// Completion callback a hardware block invokes with a filled buffer.
///
/// May run on a driver-owned thread.
pub type FrameCallback = std::sync::Arc<dyn Fn(FrameSpec) + Send + Sync>;

/// A buffer on its way into (or back out of) a hardware block, tagged with
/// the pool it came from and that pool's buffer count.
#[derive(Debug)]
pub struct FrameSpec {
    pub pool_id: PoolId,
    pub buffer_count: u32,
    pub buffer: FrameBuffer,
}

impl FrameSpec {
    pub fn new(pool_id: PoolId, buffer_count: u32, buffer: FrameBuffer) -> Self {
        Self {
            pool_id,
            buffer_count,
            buffer,
        }
    }
}
