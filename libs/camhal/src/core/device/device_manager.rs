// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Top-level owner of every manager and controller of one backend.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::controller::{downcast_controller, Controller, FlashController, SensorController, StreamController};
use super::driver::HardwareDriver;
use super::hardware_config::{HardwareConfiguration, HardwareTable};
use super::ids::{CameraId, ControllerId, FlashMode, ManagerId};
use super::manager::Manager;
use super::routing::{RouteEndpoint, RouteTable};
use crate::core::frames::{CameraMetadata, FrameCallback, FrameSpec, MetaTag};
use crate::core::{HalError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceStatus {
    PoweredUp,
    PoweredDown,
    Error,
}

/// Receives refreshed metadata for a camera.
pub type MetadataCallback = Arc<dyn Fn(CameraId, &CameraMetadata) + Send + Sync>;

/// Receives camera power/error transitions.
pub type DeviceStatusCallback = Arc<dyn Fn(CameraId, DeviceStatus) + Send + Sync>;

/// Receives hot-plug events: ability metadata, whether the camera was added,
/// and its id.
pub type HotplugCallback = Arc<dyn Fn(&CameraMetadata, bool, CameraId) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    metadata: Option<MetadataCallback>,
    status: Option<DeviceStatusCallback>,
    hotplug: Option<HotplugCallback>,
}

/// Owns the managers of one backend, built from its [`HardwareTable`].
///
/// The shared media system is started before the first controller powers
/// up and stopped once no controller is powered.
pub struct DeviceManager {
    backend: String,
    driver: Arc<dyn HardwareDriver>,
    routes: RouteTable,
    table: RwLock<HardwareTable>,
    managers: RwLock<Vec<Arc<Manager>>>,
    system_started: Mutex<bool>,
    callbacks: RwLock<Callbacks>,
}

impl DeviceManager {
    pub fn new(
        backend: impl Into<String>,
        driver: Arc<dyn HardwareDriver>,
        table: HardwareTable,
        routes: RouteTable,
    ) -> Self {
        Self {
            backend: backend.into(),
            driver,
            routes,
            table: RwLock::new(table),
            managers: RwLock::new(Vec::new()),
            system_started: Mutex::new(false),
            callbacks: RwLock::new(Callbacks::default()),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn driver(&self) -> &Arc<dyn HardwareDriver> {
        &self.driver
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Snapshot of the current hardware table.
    pub fn hardware_table(&self) -> HardwareTable {
        self.table.read().clone()
    }

    pub fn is_initialized(&self) -> bool {
        !self.managers.read().is_empty()
    }

    /// Build managers and controllers from the hardware table.
    pub fn init(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.create_manager()?;
        tracing::info!(
            "[{}] device manager ready ({} managers)",
            self.backend,
            self.managers.read().len()
        );
        Ok(())
    }

    /// Walk the table creating each row's manager and controller.
    ///
    /// All or nothing: the first failure discards everything built so far.
    pub fn create_manager(&self) -> Result<()> {
        let table = self.table.read().clone();
        let mut built: Vec<Arc<Manager>> = Vec::new();
        for row in table.rows() {
            let manager = match built.iter().find(|m| m.id() == row.manager) {
                Some(manager) => Arc::clone(manager),
                None => {
                    let manager = Arc::new(Manager::new(row.manager, Arc::clone(&self.driver)));
                    built.push(Arc::clone(&manager));
                    manager
                }
            };
            if let Err(e) = manager.create_controller(row.controller, &row.hardware_name) {
                tracing::error!(
                    "[{}] creating {} controller '{}' failed: {}",
                    self.backend,
                    row.manager,
                    row.hardware_name,
                    e
                );
                return Err(e);
            }
        }
        *self.managers.write() = built;
        Ok(())
    }

    pub fn get_manager(&self, id: ManagerId) -> Option<Arc<Manager>> {
        self.managers.read().iter().find(|m| m.id() == id).cloned()
    }

    /// Controller in `manager`, scoped to `camera` for keyed categories.
    pub fn get_controller(
        &self,
        manager: ManagerId,
        controller: ControllerId,
        camera: Option<CameraId>,
    ) -> Option<Arc<dyn Controller>> {
        let name = camera.and_then(|c| {
            self.table
                .read()
                .hardware_name(c, manager)
                .map(str::to_string)
        });
        self.get_manager(manager)?
            .get_controller(controller, name.as_deref())
    }

    fn stream_controller(&self, manager: ManagerId, controller: ControllerId) -> Result<Arc<StreamController>> {
        self.get_controller(manager, controller, None)
            .and_then(downcast_controller::<StreamController>)
            .ok_or_else(|| {
                HalError::NotFound(format!(
                    "[{}] no {} controller in {} manager",
                    self.backend, controller, manager
                ))
            })
    }

    pub fn get_camera_ids(&self) -> Vec<CameraId> {
        self.table.read().camera_ids()
    }

    pub fn get_sensor(&self, camera: CameraId) -> Option<Arc<SensorController>> {
        self.get_controller(ManagerId::Sensor, ControllerId::Sensor, Some(camera))
            .and_then(downcast_controller::<SensorController>)
    }

    fn check_camera(&self, camera: CameraId) -> Result<()> {
        if self.table.read().contains_camera(camera) {
            Ok(())
        } else {
            Err(HalError::InvalidArgument(format!(
                "[{}] unknown camera {}",
                self.backend, camera
            )))
        }
    }

    /// Power up every controller the camera uses.
    ///
    /// Fails fast; controllers powered before the failure stay powered.
    pub fn power_up(&self, camera: CameraId) -> Result<()> {
        self.check_camera(camera)?;
        {
            let mut started = self.system_started.lock();
            if !*started {
                self.driver.start_system()?;
                *started = true;
                tracing::info!("[{}] media system started", self.backend);
            }
        }

        let managers = self.managers.read().clone();
        for manager in managers {
            let name = self
                .table
                .read()
                .hardware_name(camera, manager.id())
                .map(str::to_string);
            if let Err(e) = manager.power_up(name.as_deref()) {
                tracing::error!("[{}] power up of {} failed: {}", self.backend, camera, e);
                self.notify_status(camera, DeviceStatus::Error);
                return Err(e);
            }
        }
        tracing::info!("[{}] {} powered up", self.backend, camera);
        self.notify_status(camera, DeviceStatus::PoweredUp);
        Ok(())
    }

    /// Power down every controller the camera uses; stop the media system
    /// once nothing is powered.
    pub fn power_down(&self, camera: CameraId) -> Result<()> {
        self.check_camera(camera)?;
        let managers = self.managers.read().clone();
        let mut first_error = None;
        for manager in &managers {
            let name = self
                .table
                .read()
                .hardware_name(camera, manager.id())
                .map(str::to_string);
            if let Err(e) = manager.power_down(name.as_deref()) {
                tracing::error!("[{}] power down of {} failed: {}", self.backend, camera, e);
                first_error.get_or_insert(e);
            }
        }

        if !managers.iter().any(|m| m.any_powered()) {
            let mut started = self.system_started.lock();
            if *started {
                self.driver.stop_system()?;
                *started = false;
                tracing::info!("[{}] media system stopped", self.backend);
            }
        }

        match first_error {
            Some(e) => {
                self.notify_status(camera, DeviceStatus::Error);
                Err(e)
            }
            None => {
                self.notify_status(camera, DeviceStatus::PoweredDown);
                Ok(())
            }
        }
    }

    pub fn is_system_started(&self) -> bool {
        *self.system_started.lock()
    }

    pub fn set_flashlight(&self, mode: FlashMode, enable: bool) -> Result<()> {
        let flash = self
            .get_manager(ManagerId::Flash)
            .and_then(|m| m.controllers().into_iter().next())
            .and_then(downcast_controller::<FlashController>)
            .ok_or_else(|| HalError::NotFound(format!("[{}] no flash controller", self.backend)))?;
        flash.set_flashlight(mode, enable)
    }

    pub fn set_node_callback(
        &self,
        manager: ManagerId,
        controller: ControllerId,
        callback: FrameCallback,
    ) -> Result<()> {
        self.stream_controller(manager, controller)?
            .set_node_callback(callback);
        Ok(())
    }

    pub fn send_frame_buffer(
        &self,
        frame: FrameSpec,
        manager: ManagerId,
        controller: ControllerId,
    ) -> Result<()> {
        self.stream_controller(manager, controller)?.send_frame(frame)
    }

    fn camera_controllers(&self, camera: CameraId) -> Vec<Arc<dyn Controller>> {
        let rows: Vec<HardwareConfiguration> =
            self.table.read().rows_for_camera(camera).cloned().collect();
        rows.iter()
            .filter_map(|row| {
                self.get_manager(row.manager)?
                    .get_controller(row.controller, Some(&row.hardware_name))
            })
            .collect()
    }

    pub fn set_ability_meta_tags(&self, camera: CameraId, tags: &[MetaTag]) -> Result<()> {
        self.check_camera(camera)?;
        for controller in self.camera_controllers(camera) {
            controller.set_ability_meta_tags(tags)?;
        }
        Ok(())
    }

    /// Merged ability metadata of every controller the camera uses.
    pub fn get_ability_metadata(&self, camera: CameraId) -> Result<CameraMetadata> {
        self.check_camera(camera)?;
        let mut meta = CameraMetadata::new();
        for controller in self.camera_controllers(camera) {
            controller.get_ability_meta(&mut meta)?;
        }
        Ok(meta)
    }

    pub fn set_metadata_callback(&self, callback: MetadataCallback) {
        self.callbacks.write().metadata = Some(callback);
    }

    /// Push fresh ability metadata for `camera` to the metadata callback.
    pub fn update_metadata(&self, camera: CameraId) -> Result<()> {
        let meta = self.get_ability_metadata(camera)?;
        let callback = self.callbacks.read().metadata.clone();
        if let Some(callback) = callback {
            callback(camera, &meta);
        }
        Ok(())
    }

    pub fn set_device_status_callback(&self, callback: DeviceStatusCallback) {
        self.callbacks.write().status = Some(callback);
    }

    fn notify_status(&self, camera: CameraId, status: DeviceStatus) {
        let callback = self.callbacks.read().status.clone();
        if let Some(callback) = callback {
            callback(camera, status);
        }
    }

    pub fn set_hotplug_callback(&self, callback: HotplugCallback) {
        self.callbacks.write().hotplug = Some(callback);
    }

    /// Register a camera that appeared at runtime.
    pub fn hotplug_add(&self, row: HardwareConfiguration) -> Result<()> {
        let camera = row.camera_id;
        let manager = match self.get_manager(row.manager) {
            Some(manager) => manager,
            None => {
                let manager = Arc::new(Manager::new(row.manager, Arc::clone(&self.driver)));
                self.managers.write().push(Arc::clone(&manager));
                manager
            }
        };
        manager.create_controller(row.controller, &row.hardware_name)?;
        self.table.write().insert(row);

        let meta = self.get_ability_metadata(camera).unwrap_or_else(|e| {
            tracing::warn!("[{}] no ability metadata for {}: {}", self.backend, camera, e);
            CameraMetadata::new()
        });
        tracing::info!("[{}] {} plugged in", self.backend, camera);
        let callback = self.callbacks.read().hotplug.clone();
        if let Some(callback) = callback {
            callback(&meta, true, camera);
        }
        Ok(())
    }

    /// Forget a camera that disappeared at runtime.
    ///
    /// Only per-camera controllers (sensor, flash) are removed; shared media
    /// blocks stay.
    pub fn hotplug_remove(&self, camera: CameraId) -> Result<()> {
        self.check_camera(camera)?;
        let rows = self.table.write().remove_camera(camera);
        for row in rows.iter().filter(|r| r.manager.is_keyed()) {
            if let Some(manager) = self.get_manager(row.manager) {
                manager.remove_controller(&row.hardware_name);
            }
        }
        tracing::info!("[{}] {} unplugged", self.backend, camera);
        let callback = self.callbacks.read().hotplug.clone();
        if let Some(callback) = callback {
            callback(&CameraMetadata::new(), false, camera);
        }
        Ok(())
    }

    /// Wire `src_node.src_port` to `dst_node.dst_port` in hardware.
    ///
    /// Names that are not media blocks, and pairs without a route, need no
    /// wiring and succeed. A display block as source is an error. A
    /// destination block that is not running yet is started with its last
    /// configuration.
    pub fn connect(&self, src_node: &str, src_port: &str, dst_node: &str, dst_port: &str) -> Result<()> {
        let Some((src, dst)) = self.parse_route(src_node, src_port, dst_node, dst_port)? else {
            return Ok(());
        };
        let Some(_route) = self.routes.get(src.kind, dst.kind) else {
            tracing::debug!("[{}] no route {} -> {}", self.backend, src, dst);
            return Ok(());
        };

        let destination = self.stream_controller(dst.kind.manager_id(), dst.kind.controller_id())?;
        if !destination.is_started() {
            destination.start()?;
        }
        self.driver.bind(&src, &dst)?;
        tracing::info!("[{}] bound {} -> {}", self.backend, src, dst);
        Ok(())
    }

    /// Undo [`DeviceManager::connect`] for routes that need an explicit unbind.
    pub fn unconnect(&self, src_node: &str, src_port: &str, dst_node: &str, dst_port: &str) -> Result<()> {
        let Some((src, dst)) = self.parse_route(src_node, src_port, dst_node, dst_port)? else {
            return Ok(());
        };
        match self.routes.get(src.kind, dst.kind) {
            Some(route) if route.unbind_required => {
                self.driver.unbind(&src, &dst)?;
                tracing::info!("[{}] unbound {} -> {}", self.backend, src, dst);
            }
            _ => {}
        }
        Ok(())
    }

    fn parse_route(
        &self,
        src_node: &str,
        src_port: &str,
        dst_node: &str,
        dst_port: &str,
    ) -> Result<Option<(RouteEndpoint, RouteEndpoint)>> {
        let (Some(src), Some(dst)) = (
            RouteEndpoint::parse(src_node, src_port),
            RouteEndpoint::parse(dst_node, dst_port),
        ) else {
            return Ok(None);
        };
        if !src.kind.has_outputs() {
            return Err(HalError::InvalidArgument(format!(
                "'{}' cannot be a route source",
                src_node
            )));
        }
        Ok(Some((src, dst)))
    }
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("backend", &self.backend)
            .field("managers", &self.managers.read().len())
            .field("routes", &self.routes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::{DriverOp, HardwareVariant, SimulatedDriver};

    fn mpi(sim: &Arc<SimulatedDriver>) -> DeviceManager {
        let dm = DeviceManager::new(
            "mpi",
            sim.clone(),
            HardwareTable::builtin(HardwareVariant::Mpi),
            RouteTable::mpi(),
        );
        dm.init().unwrap();
        dm
    }

    #[test]
    fn test_init_builds_one_manager_per_category() {
        let sim = Arc::new(SimulatedDriver::new());
        let dm = mpi(&sim);
        for id in ManagerId::ALL {
            assert!(dm.get_manager(id).is_some(), "missing {}", id);
        }
        assert_eq!(dm.get_manager(ManagerId::Sensor).unwrap().controllers().len(), 2);
        assert_eq!(dm.get_sensor(CameraId(2)).unwrap().sensor_name(), "imx600");
    }

    #[test]
    fn test_init_is_all_or_nothing() {
        let sim = Arc::new(SimulatedDriver::new());
        sim.fail_on(DriverOp::Init, "vpss");
        let dm = DeviceManager::new(
            "mpi",
            sim.clone(),
            HardwareTable::builtin(HardwareVariant::Mpi),
            RouteTable::mpi(),
        );
        assert!(dm.init().is_err());
        assert!(!dm.is_initialized());
        assert!(dm.get_manager(ManagerId::Sensor).is_none());
    }

    #[test]
    fn test_power_cycle_starts_system_once() {
        let sim = Arc::new(SimulatedDriver::new());
        let dm = mpi(&sim);
        dm.power_up(CameraId(1)).unwrap();
        dm.power_up(CameraId(1)).unwrap();
        assert_eq!(sim.call_count(DriverOp::StartSystem, "system"), 1);
        assert_eq!(sim.call_count(DriverOp::PowerUp, "imx335"), 1);
        assert_eq!(sim.call_count(DriverOp::PowerUp, "imx600"), 0);

        dm.power_down(CameraId(1)).unwrap();
        assert!(!dm.is_system_started());
        assert_eq!(sim.call_count(DriverOp::StopSystem, "system"), 1);
    }

    #[test]
    fn test_power_up_unknown_camera_rejected() {
        let sim = Arc::new(SimulatedDriver::new());
        let dm = mpi(&sim);
        assert!(matches!(dm.power_up(CameraId(9)), Err(HalError::InvalidArgument(_))));
        assert_eq!(sim.call_count(DriverOp::StartSystem, "system"), 0);
    }

    #[test]
    fn test_power_up_fails_fast_without_rollback() {
        let sim = Arc::new(SimulatedDriver::new());
        sim.fail_on(DriverOp::PowerUp, "flash0");
        let dm = mpi(&sim);
        assert!(dm.power_up(CameraId(1)).is_err());
        assert!(dm.get_sensor(CameraId(1)).unwrap().is_powered());
        assert!(dm.is_system_started());
    }

    #[test]
    fn test_status_callback_reports_transitions() {
        let sim = Arc::new(SimulatedDriver::new());
        let dm = mpi(&sim);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        dm.set_device_status_callback(Arc::new(move |camera, status| {
            seen_clone.lock().push((camera, status));
        }));
        dm.power_up(CameraId(1)).unwrap();
        dm.power_down(CameraId(1)).unwrap();
        assert_eq!(
            *seen.lock(),
            vec![(CameraId(1), DeviceStatus::PoweredUp), (CameraId(1), DeviceStatus::PoweredDown)]
        );
    }

    #[test]
    fn test_flashlight_reaches_driver() {
        let sim = Arc::new(SimulatedDriver::new());
        let dm = mpi(&sim);
        dm.power_up(CameraId(1)).unwrap();
        dm.set_flashlight(FlashMode::Torch, true).unwrap();
        assert_eq!(sim.flashlight("flash0"), Some((FlashMode::Torch, true)));
    }

    #[test]
    fn test_hotplug_add_and_remove() {
        let sim = Arc::new(SimulatedDriver::new());
        let dm = DeviceManager::new(
            "v4l2",
            sim.clone(),
            HardwareTable::builtin(HardwareVariant::V4l2),
            RouteTable::empty(),
        );
        dm.init().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        dm.set_hotplug_callback(Arc::new(move |_meta, added, camera| {
            events_clone.lock().push((camera, added));
        }));

        dm.hotplug_add(HardwareConfiguration::new(
            CameraId(2),
            ManagerId::Sensor,
            ControllerId::Sensor,
            "usb_cam",
        ))
        .unwrap();
        assert_eq!(dm.get_camera_ids(), vec![CameraId(1), CameraId(2)]);
        assert!(dm.get_sensor(CameraId(2)).is_some());

        dm.hotplug_remove(CameraId(2)).unwrap();
        assert_eq!(dm.get_camera_ids(), vec![CameraId(1)]);
        assert_eq!(dm.get_manager(ManagerId::Sensor).unwrap().controllers().len(), 1);
        assert_eq!(*events.lock(), vec![(CameraId(2), true), (CameraId(2), false)]);
    }

    #[test]
    fn test_update_metadata_invokes_callback() {
        let sim = Arc::new(SimulatedDriver::new());
        let mut ability = CameraMetadata::new();
        ability.set(crate::core::frames::tags::FLASH_AVAILABLE, crate::core::frames::MetaValue::U8(vec![1]));
        sim.set_ability_metadata("flash0", ability);
        let dm = mpi(&sim);

        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        dm.set_metadata_callback(Arc::new(move |camera, meta| {
            *seen_clone.lock() = Some((camera, meta.len()));
        }));
        dm.update_metadata(CameraId(1)).unwrap();
        assert_eq!(*seen.lock(), Some((CameraId(1), 1)));
    }
}
