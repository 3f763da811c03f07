// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::device_manager::DeviceManager;
use super::driver::HardwareDriver;
use super::hardware_config::{HardwareTable, HardwareVariant};
use super::routing::RouteTable;
use crate::core::{HalError, Result};

mod private {
    use super::{DeviceManager, Result};

    /// Builds an uninitialized device manager for one backend.
    pub type ConstructorFn = Box<dyn Fn() -> Result<DeviceManager> + Send + Sync>;
}

/// Name-keyed table of device manager backends.
///
/// Each backend is constructed and initialized on first request; later
/// requests return the same instance.
pub struct DeviceManagerRegistry {
    constructors: RwLock<HashMap<String, private::ConstructorFn>>,
    instances: Mutex<HashMap<String, Arc<DeviceManager>>>,
}

impl Default for DeviceManagerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceManagerRegistry {
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with the `mpi` and `v4l2` backends on `driver`.
    pub fn with_builtin_backends(driver: Arc<dyn HardwareDriver>) -> Self {
        let registry = Self::new();
        for variant in [HardwareVariant::Mpi, HardwareVariant::V4l2] {
            let routes = match variant {
                HardwareVariant::Mpi => RouteTable::mpi(),
                HardwareVariant::V4l2 => RouteTable::empty(),
            };
            registry.register_table(variant.name(), Arc::clone(&driver), HardwareTable::builtin(variant), routes);
        }
        registry
    }

    /// Register a backend constructor. An existing name is replaced.
    pub fn register<F>(&self, backend: &str, constructor: F)
    where
        F: Fn() -> Result<DeviceManager> + Send + Sync + 'static,
    {
        let previous = self
            .constructors
            .write()
            .insert(backend.to_string(), Box::new(constructor));
        if previous.is_some() {
            tracing::debug!("[register] backend '{}' replaced", backend);
        } else {
            tracing::debug!("[register] backend '{}' registered", backend);
        }
    }

    /// Register a backend built from a fixed hardware table.
    pub fn register_table(
        &self,
        backend: &str,
        driver: Arc<dyn HardwareDriver>,
        table: HardwareTable,
        routes: RouteTable,
    ) {
        let name = backend.to_string();
        self.register(backend, move || {
            Ok(DeviceManager::new(
                name.clone(),
                Arc::clone(&driver),
                table.clone(),
                routes.clone(),
            ))
        });
    }

    pub fn can_create(&self, backend: &str) -> bool {
        self.constructors.read().contains_key(backend)
    }

    /// The initialized device manager of `backend`.
    pub fn get_or_create(&self, backend: &str) -> Result<Arc<DeviceManager>> {
        let mut instances = self.instances.lock();
        if let Some(existing) = instances.get(backend) {
            return Ok(Arc::clone(existing));
        }

        let device_manager = {
            let constructors = self.constructors.read();
            let constructor = constructors.get(backend).ok_or_else(|| {
                HalError::NotFound(format!("No device manager registered for backend '{}'", backend))
            })?;
            constructor()?
        };
        device_manager.init()?;

        let device_manager = Arc::new(device_manager);
        instances.insert(backend.to_string(), Arc::clone(&device_manager));
        tracing::info!("[{}] device manager created", backend);
        Ok(device_manager)
    }

    /// Already-created instance of `backend`, if any.
    pub fn get(&self, backend: &str) -> Option<Arc<DeviceManager>> {
        self.instances.lock().get(backend).cloned()
    }

    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.read().keys().cloned().collect();
        names.sort();
        names
    }
}
