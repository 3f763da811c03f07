// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{BufferPool, HeapBufferPool, HeapBufferPoolConfig};
use crate::core::frames::PoolId;

/// Process-scoped map from pool id to pool.
///
/// Nodes resolve the pool behind a port through this registry using the
/// pool id recorded in the port's format.
pub struct BufferPoolRegistry {
    pools: RwLock<HashMap<PoolId, Arc<dyn BufferPool>>>,
    next_id: AtomicU64,
}

impl Default for BufferPoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPoolRegistry {
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            // Pool id 0 means "no pool" in a port format.
            next_id: AtomicU64::new(1),
        }
    }

    /// Reserve a fresh pool id.
    pub fn next_pool_id(&self) -> PoolId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate and register a heap pool.
    pub fn create_heap_pool(&self, config: HeapBufferPoolConfig) -> Arc<HeapBufferPool> {
        let pool = Arc::new(HeapBufferPool::new(self.next_pool_id(), config));
        self.register(pool.clone());
        pool
    }

    /// Register an externally created pool under its own id.
    pub fn register(&self, pool: Arc<dyn BufferPool>) {
        let id = pool.id();
        if self.pools.write().insert(id, pool).is_some() {
            tracing::warn!("[pool {}] replaced an already registered pool", id);
        }
    }

    pub fn get(&self, id: PoolId) -> Option<Arc<dyn BufferPool>> {
        self.pools.read().get(&id).cloned()
    }

    pub fn remove(&self, id: PoolId) -> Option<Arc<dyn BufferPool>> {
        self.pools.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }
}

impl std::fmt::Debug for BufferPoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPoolRegistry")
            .field("pools", &self.pools.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frames::PixelFormat;

    #[test]
    fn test_pool_ids_are_unique_and_nonzero() {
        let registry = BufferPoolRegistry::new();
        let config = HeapBufferPoolConfig::new(1, 2, 2, PixelFormat::Rgba8888);
        let a = registry.create_heap_pool(config);
        let b = registry.create_heap_pool(config);
        assert_ne!(a.id(), 0);
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
        assert!(registry.get(a.id()).is_some());
        assert!(registry.get(999).is_none());

        registry.remove(a.id());
        assert!(registry.get(a.id()).is_none());
    }
}
