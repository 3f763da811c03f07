// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Buffer pools feeding the pipeline.
//!
//! [`BufferPool`] is the narrow interface the pipeline consumes; pools own
//! their locking. [`HeapBufferPool`] is the in-process implementation and
//! [`BufferPoolRegistry`] resolves a port's pool id to its pool.

mod heap_pool;
mod registry;

use std::time::Duration;

use crate::core::frames::{FrameBuffer, PoolId};

pub use heap_pool::{HeapBufferPool, HeapBufferPoolConfig};
pub use registry::BufferPoolRegistry;

/// Source of empty frame buffers.
pub trait BufferPool: Send + Sync {
    /// Pool identifier stamped on every buffer it issues.
    fn id(&self) -> PoolId;

    /// Take an idle buffer.
    ///
    /// `None` waits indefinitely; `Some(d)` waits at most `d`. Returns `None`
    /// on timeout, or promptly once the pool has been told to stop.
    fn acquire_buffer(&self, timeout: Option<Duration>) -> Option<FrameBuffer>;

    /// Re-enable acquisition after [`BufferPool::notify_stop`].
    fn notify_start(&self);

    /// Wake every blocked acquirer and make acquisition return `None`.
    fn notify_stop(&self);

    /// Number of buffers currently available for acquisition.
    fn idle_buffer_count(&self) -> usize;

    /// Total number of buffers owned by the pool.
    fn buffer_count(&self) -> u32;

    /// Payload size of every buffer in bytes.
    fn buffer_size(&self) -> usize;
}
