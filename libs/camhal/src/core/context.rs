// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use crate::core::device::DeviceManager;
use crate::core::pool::BufferPoolRegistry;

/// Process-scoped services shared by the nodes of a pipeline.
#[derive(Debug, Clone, Default)]
pub struct HalContext {
    pub pools: Arc<BufferPoolRegistry>,
    /// Needed only by hardware-backed nodes.
    pub device_manager: Option<Arc<DeviceManager>>,
}

impl HalContext {
    pub fn new(pools: Arc<BufferPoolRegistry>, device_manager: Option<Arc<DeviceManager>>) -> Self {
        Self {
            pools,
            device_manager,
        }
    }

    /// Context for software-only pipelines.
    pub fn software() -> Self {
        Self::default()
    }

    pub fn with_device_manager(device_manager: Arc<DeviceManager>) -> Self {
        Self::new(Arc::new(BufferPoolRegistry::new()), Some(device_manager))
    }
}
