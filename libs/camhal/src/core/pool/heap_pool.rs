// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Fixed-size heap-backed buffer pool.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use super::BufferPool;
use crate::core::frames::{BufferRecycler, FrameBuffer, FramePayload, PixelFormat, PoolId};

/// Geometry and size of a heap pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapBufferPoolConfig {
    pub buffer_count: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub format: PixelFormat,
    #[serde(default)]
    pub usage: u64,
}

impl HeapBufferPoolConfig {
    pub fn new(buffer_count: u32, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            buffer_count,
            width,
            height,
            format,
            usage: 0,
        }
    }

    /// Payload size of one buffer.
    pub fn buffer_size(&self) -> usize {
        self.format.frame_size(self.width, self.height)
    }
}

struct PoolState {
    idle: VecDeque<(u32, FramePayload)>,
    stopped: bool,
}

struct HeapPoolInner {
    id: PoolId,
    config: HeapBufferPoolConfig,
    buffer_size: usize,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl BufferRecycler for HeapPoolInner {
    fn recycle(&self, index: u32, data: FramePayload) {
        let mut state = self.state.lock();
        state.idle.push_back((index, data));
        // Signal waiting acquirers
        self.available.notify_one();
    }
}

/// Pool of `buffer_count` equally sized heap buffers.
///
/// Buffers come back automatically when the last owner drops them.
pub struct HeapBufferPool {
    inner: Arc<HeapPoolInner>,
}

impl HeapBufferPool {
    /// Allocate every buffer up front.
    pub fn new(id: PoolId, config: HeapBufferPoolConfig) -> Self {
        let buffer_size = config.buffer_size();
        let idle = (0..config.buffer_count)
            .map(|index| (index, Arc::new(vec![0u8; buffer_size])))
            .collect();

        tracing::debug!(
            "[pool {}] allocated {} x {} bytes ({}x{} {})",
            id,
            config.buffer_count,
            buffer_size,
            config.width,
            config.height,
            config.format
        );

        Self {
            inner: Arc::new(HeapPoolInner {
                id,
                config,
                buffer_size,
                state: Mutex::new(PoolState {
                    idle,
                    stopped: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    pub fn config(&self) -> &HeapBufferPoolConfig {
        &self.inner.config
    }

    fn issue(&self, index: u32, data: FramePayload) -> FrameBuffer {
        let weak: Weak<HeapPoolInner> = Arc::downgrade(&self.inner);
        let recycler: Weak<dyn BufferRecycler> = weak;
        let mut buffer = FrameBuffer::pooled(index, self.inner.id, data, recycler);
        buffer.reset();
        buffer.width = self.inner.config.width;
        buffer.height = self.inner.config.height;
        buffer.format = self.inner.config.format;
        buffer.usage = self.inner.config.usage;
        buffer
    }
}

impl BufferPool for HeapBufferPool {
    fn id(&self) -> PoolId {
        self.inner.id
    }

    fn acquire_buffer(&self, timeout: Option<Duration>) -> Option<FrameBuffer> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.inner.state.lock();
        loop {
            if state.stopped {
                return None;
            }
            if let Some((index, data)) = state.idle.pop_front() {
                drop(state);
                return Some(self.issue(index, data));
            }
            match deadline {
                None => self.inner.available.wait(&mut state),
                Some(deadline) => {
                    if self
                        .inner
                        .available
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        if state.stopped {
                            return None;
                        }
                        let (index, data) = state.idle.pop_front()?;
                        drop(state);
                        return Some(self.issue(index, data));
                    }
                }
            }
        }
    }

    fn notify_start(&self) {
        self.inner.state.lock().stopped = false;
    }

    fn notify_stop(&self) {
        let mut state = self.inner.state.lock();
        state.stopped = true;
        self.inner.available.notify_all();
    }

    fn idle_buffer_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    fn buffer_count(&self) -> u32 {
        self.inner.config.buffer_count
    }

    fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }
}

impl std::fmt::Debug for HeapBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapBufferPool")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn small_pool(count: u32) -> HeapBufferPool {
        HeapBufferPool::new(5, HeapBufferPoolConfig::new(count, 4, 2, PixelFormat::Rgba8888))
    }

    #[test]
    fn test_acquire_and_reclaim_on_drop() {
        let pool = small_pool(2);
        assert_eq!(pool.idle_buffer_count(), 2);

        let a = pool.acquire_buffer(Some(Duration::ZERO)).unwrap();
        let b = pool.acquire_buffer(Some(Duration::ZERO)).unwrap();
        assert_eq!(a.pool_id(), 5);
        assert_eq!(a.size(), 32);
        assert_eq!(pool.idle_buffer_count(), 0);
        assert!(pool.acquire_buffer(Some(Duration::from_millis(10))).is_none());

        drop(a);
        drop(b);
        assert_eq!(pool.idle_buffer_count(), 2);
    }

    #[test]
    fn test_reissued_buffer_is_reset() {
        let pool = small_pool(1);
        let mut buffer = pool.acquire_buffer(None).unwrap();
        buffer.capture_id = 42;
        buffer.mark_invalid();
        drop(buffer);

        let buffer = pool.acquire_buffer(None).unwrap();
        assert!(buffer.is_valid());
        assert_eq!(buffer.capture_id, crate::core::frames::INVALID_CAPTURE_ID);
    }

    #[test]
    fn test_notify_stop_releases_blocked_acquire() {
        let pool = Arc::new(small_pool(1));
        let held = pool.acquire_buffer(None).unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire_buffer(None))
        };
        thread::sleep(Duration::from_millis(20));
        pool.notify_stop();
        assert!(waiter.join().unwrap().is_none());

        drop(held);
        assert!(pool.acquire_buffer(Some(Duration::ZERO)).is_none());
        pool.notify_start();
        assert!(pool.acquire_buffer(Some(Duration::ZERO)).is_some());
    }

    #[test]
    fn test_blocked_acquire_wakes_on_return() {
        let pool = Arc::new(small_pool(1));
        let held = pool.acquire_buffer(None).unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire_buffer(Some(Duration::from_secs(5))))
        };
        thread::sleep(Duration::from_millis(20));
        drop(held);
        assert!(waiter.join().unwrap().is_some());
    }
}
