// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Hardware side of the HAL.
//!
//! A [`DeviceManager`] owns one [`Manager`] per hardware category; each
//! manager owns the [`Controller`]s created from the [`HardwareTable`]. All
//! vendor calls go through a [`HardwareDriver`].

mod controller;
mod device_manager;
mod driver;
mod hardware_config;
mod ids;
mod manager;
mod registry;
mod routing;
mod simulated;

pub use controller::{
    downcast_controller, Controller, ControllerCore, FlashController, IspController,
    SensorController, StreamController,
};
pub use device_manager::{
    DeviceManager, DeviceStatus, DeviceStatusCallback, HotplugCallback, MetadataCallback,
};
pub use driver::{HardwareDriver, StreamConfig};
pub use hardware_config::{HardwareConfiguration, HardwareTable, HardwareVariant};
pub use ids::{CameraId, ControllerId, FlashMode, ManagerId};
pub use manager::Manager;
pub use registry::DeviceManagerRegistry;
pub use routing::{parse_index, RouteEndpoint, RouteHandler, RouteTable, StageKind};
pub use simulated::{DriverOp, SimulatedDriver};
