// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Controllers own one piece of hardware each.
//!
//! Power state is guarded per controller; power operations are idempotent.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use super::driver::{HardwareDriver, StreamConfig};
use super::ids::{ControllerId, FlashMode};
use crate::core::frames::{CameraMetadata, FrameCallback, FrameSpec, MetaTag};
use crate::core::{HalError, Result};

/// State every controller shares: identity, driver handle, power flag and
/// subscribed ability tags.
pub struct ControllerCore {
    id: ControllerId,
    hardware_name: String,
    driver: Arc<dyn HardwareDriver>,
    powered: Mutex<bool>,
    ability_tags: Mutex<Vec<MetaTag>>,
}

impl ControllerCore {
    pub fn new(
        id: ControllerId,
        hardware_name: impl Into<String>,
        driver: Arc<dyn HardwareDriver>,
    ) -> Self {
        Self {
            id,
            hardware_name: hardware_name.into(),
            driver,
            powered: Mutex::new(false),
            ability_tags: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn hardware_name(&self) -> &str {
        &self.hardware_name
    }

    pub fn driver(&self) -> &Arc<dyn HardwareDriver> {
        &self.driver
    }
}

/// Capability interface of a controller.
pub trait Controller: Send + Sync + 'static {
    fn core(&self) -> &ControllerCore;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn controller_id(&self) -> ControllerId {
        self.core().id
    }

    fn hardware_name(&self) -> &str {
        &self.core().hardware_name
    }

    fn init(&self) -> Result<()> {
        self.core().driver.init(self.hardware_name())
    }

    fn power_up(&self) -> Result<()> {
        let core = self.core();
        let mut powered = core.powered.lock();
        if *powered {
            tracing::debug!("[{}] already powered up", core.hardware_name);
            return Ok(());
        }
        core.driver.power_up(&core.hardware_name)?;
        *powered = true;
        tracing::info!("[{}] powered up", core.hardware_name);
        Ok(())
    }

    fn power_down(&self) -> Result<()> {
        let core = self.core();
        let mut powered = core.powered.lock();
        if !*powered {
            tracing::debug!("[{}] already powered down", core.hardware_name);
            return Ok(());
        }
        core.driver.power_down(&core.hardware_name)?;
        *powered = false;
        tracing::info!("[{}] powered down", core.hardware_name);
        Ok(())
    }

    fn is_powered(&self) -> bool {
        *self.core().powered.lock()
    }

    /// Subscribe to the ability tags this controller should report.
    fn set_ability_meta_tags(&self, tags: &[MetaTag]) -> Result<()> {
        let core = self.core();
        core.driver.set_ability_metadata_tags(&core.hardware_name, tags)?;
        *core.ability_tags.lock() = tags.to_vec();
        Ok(())
    }

    /// Merge this controller's abilities into `meta`, filtered to the
    /// subscribed tags when any are set.
    fn get_ability_meta(&self, meta: &mut CameraMetadata) -> Result<()> {
        let core = self.core();
        let mut ability = core.driver.get_ability_metadata(&core.hardware_name)?;
        let tags = core.ability_tags.lock();
        if !tags.is_empty() {
            ability.retain_tags(&tags);
        }
        meta.merge(&ability);
        Ok(())
    }
}

/// Downcast a shared controller to its concrete type.
pub fn downcast_controller<T: Controller>(controller: Arc<dyn Controller>) -> Option<Arc<T>> {
    controller.into_any().downcast::<T>().ok()
}

pub struct SensorController {
    core: ControllerCore,
}

impl SensorController {
    pub fn new(hardware_name: impl Into<String>, driver: Arc<dyn HardwareDriver>) -> Self {
        Self {
            core: ControllerCore::new(ControllerId::Sensor, hardware_name, driver),
        }
    }

    /// Sensor model name.
    pub fn sensor_name(&self) -> &str {
        self.core.hardware_name()
    }
}

impl Controller for SensorController {
    fn core(&self) -> &ControllerCore {
        &self.core
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub struct IspController {
    core: ControllerCore,
}

impl IspController {
    pub fn new(hardware_name: impl Into<String>, driver: Arc<dyn HardwareDriver>) -> Self {
        Self {
            core: ControllerCore::new(ControllerId::Isp, hardware_name, driver),
        }
    }
}

impl Controller for IspController {
    fn core(&self) -> &ControllerCore {
        &self.core
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub struct FlashController {
    core: ControllerCore,
    state: Mutex<(FlashMode, bool)>,
}

impl FlashController {
    pub fn new(hardware_name: impl Into<String>, driver: Arc<dyn HardwareDriver>) -> Self {
        Self {
            core: ControllerCore::new(ControllerId::Flash, hardware_name, driver),
            state: Mutex::new((FlashMode::Off, false)),
        }
    }

    pub fn set_flashlight(&self, mode: FlashMode, enable: bool) -> Result<()> {
        if !self.is_powered() {
            return Err(HalError::Hardware(format!(
                "flash '{}' is not powered",
                self.hardware_name()
            )));
        }
        let mut state = self.state.lock();
        self.core
            .driver
            .set_flashlight(&self.core.hardware_name, mode, enable)?;
        *state = (mode, enable);
        Ok(())
    }

    pub fn flashlight(&self) -> (FlashMode, bool) {
        *self.state.lock()
    }
}

impl Controller for FlashController {
    fn core(&self) -> &ControllerCore {
        &self.core
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Controller of a frame-processing block (VI, VO, VPSS, VENC).
pub struct StreamController {
    core: ControllerCore,
    started: Mutex<bool>,
    config: Mutex<Option<StreamConfig>>,
}

impl StreamController {
    pub fn new(
        id: ControllerId,
        hardware_name: impl Into<String>,
        driver: Arc<dyn HardwareDriver>,
    ) -> Self {
        Self {
            core: ControllerCore::new(id, hardware_name, driver),
            started: Mutex::new(false),
            config: Mutex::new(None),
        }
    }

    pub fn configure(&self, config: StreamConfig) -> Result<()> {
        self.core.driver.configure(&self.core.hardware_name, &config)?;
        *self.config.lock() = Some(config);
        Ok(())
    }

    /// Last configuration pushed to the block.
    pub fn last_config(&self) -> Option<StreamConfig> {
        *self.config.lock()
    }

    /// Start the block, configuring it with defaults if it never was.
    pub fn start(&self) -> Result<()> {
        let mut started = self.started.lock();
        if *started {
            return Ok(());
        }
        if self.last_config().is_none() {
            self.configure(StreamConfig::default())?;
        }
        self.core.driver.start(&self.core.hardware_name)?;
        *started = true;
        tracing::info!("[{}] started", self.core.hardware_name);
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let mut started = self.started.lock();
        if !*started {
            return Ok(());
        }
        self.core.driver.stop(&self.core.hardware_name)?;
        *started = false;
        tracing::info!("[{}] stopped", self.core.hardware_name);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        *self.started.lock()
    }

    pub fn send_frame(&self, frame: FrameSpec) -> Result<()> {
        if !self.is_started() {
            return Err(HalError::Hardware(format!(
                "'{}' is not started",
                self.core.hardware_name
            )));
        }
        self.core.driver.send_frame(&self.core.hardware_name, frame)
    }

    pub fn set_node_callback(&self, callback: FrameCallback) {
        self.core
            .driver
            .set_node_callback(&self.core.hardware_name, Some(callback));
    }

    pub fn clear_node_callback(&self) {
        self.core.driver.set_node_callback(&self.core.hardware_name, None);
    }
}

impl Controller for StreamController {
    fn core(&self) -> &ControllerCore {
        &self.core
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Construct the controller kind `id` for `hardware_name`.
pub(crate) fn build_controller(
    id: ControllerId,
    hardware_name: &str,
    driver: Arc<dyn HardwareDriver>,
) -> Arc<dyn Controller> {
    match id {
        ControllerId::Sensor => Arc::new(SensorController::new(hardware_name, driver)),
        ControllerId::Isp => Arc::new(IspController::new(hardware_name, driver)),
        ControllerId::Flash => Arc::new(FlashController::new(hardware_name, driver)),
        ControllerId::Vi | ControllerId::Vo | ControllerId::Vpss | ControllerId::Venc => {
            Arc::new(StreamController::new(id, hardware_name, driver))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::{DriverOp, SimulatedDriver};
    use crate::core::frames::{tags, MetaValue};

    fn driver() -> Arc<SimulatedDriver> {
        Arc::new(SimulatedDriver::new())
    }

    #[test]
    fn test_power_up_is_idempotent() {
        let sim = driver();
        let sensor = SensorController::new("imx335", sim.clone());
        sensor.power_up().unwrap();
        sensor.power_up().unwrap();
        assert!(sensor.is_powered());
        assert_eq!(sim.call_count(DriverOp::PowerUp, "imx335"), 1);

        sensor.power_down().unwrap();
        sensor.power_down().unwrap();
        assert!(!sensor.is_powered());
        assert_eq!(sim.call_count(DriverOp::PowerDown, "imx335"), 1);
    }

    #[test]
    fn test_failed_power_up_leaves_flag_clear() {
        let sim = driver();
        sim.fail_on(DriverOp::PowerUp, "isp");
        let isp = IspController::new("isp", sim.clone());
        assert!(isp.power_up().is_err());
        assert!(!isp.is_powered());
    }

    #[test]
    fn test_start_configures_defaults_once() {
        let sim = driver();
        let vpss = StreamController::new(ControllerId::Vpss, "vpss", sim.clone());
        vpss.start().unwrap();
        vpss.start().unwrap();
        assert_eq!(vpss.last_config(), Some(StreamConfig::default()));
        assert_eq!(sim.call_count(DriverOp::Configure, "vpss"), 1);
        assert_eq!(sim.call_count(DriverOp::Start, "vpss"), 1);
        vpss.stop().unwrap();
        assert!(!vpss.is_started());
    }

    #[test]
    fn test_send_frame_requires_start() {
        let vi = StreamController::new(ControllerId::Vi, "vi", driver());
        let frame = FrameSpec::new(1, 1, crate::core::frames::FrameBuffer::new(0, 1, 1));
        assert!(vi.send_frame(frame).is_err());
    }

    #[test]
    fn test_ability_meta_filtered_by_tags() {
        let sim = driver();
        let mut ability = CameraMetadata::new();
        ability.set(tags::FLASH_AVAILABLE, MetaValue::U8(vec![1]));
        ability.set(tags::SENSOR_SENSITIVITY, MetaValue::I32(vec![100, 1600]));
        sim.set_ability_metadata("imx335", ability);

        let sensor = SensorController::new("imx335", sim);
        sensor.set_ability_meta_tags(&[tags::SENSOR_SENSITIVITY]).unwrap();
        let mut meta = CameraMetadata::new();
        sensor.get_ability_meta(&mut meta).unwrap();
        assert_eq!(meta.len(), 1);
        assert!(meta.contains(tags::SENSOR_SENSITIVITY));
    }

    #[test]
    fn test_flashlight_requires_power() {
        let flash = FlashController::new("flash0", driver());
        assert!(flash.set_flashlight(FlashMode::Torch, true).is_err());
        flash.power_up().unwrap();
        flash.set_flashlight(FlashMode::Torch, true).unwrap();
        assert_eq!(flash.flashlight(), (FlashMode::Torch, true));
    }

    #[test]
    fn test_downcast() {
        let controller = build_controller(ControllerId::Venc, "venc", driver());
        assert!(downcast_controller::<StreamController>(controller.clone()).is_some());
        assert!(downcast_controller::<SensorController>(controller).is_none());
    }
}
