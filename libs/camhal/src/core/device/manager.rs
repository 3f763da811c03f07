// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use parking_lot::RwLock;

use super::controller::{build_controller, Controller};
use super::driver::HardwareDriver;
use super::ids::{ControllerId, ManagerId};
use crate::core::{HalError, Result};

/// Owns the controllers of one hardware category.
///
/// Sensor and flash managers hold one controller per hardware name; the
/// other categories hold a single shared controller.
pub struct Manager {
    id: ManagerId,
    driver: Arc<dyn HardwareDriver>,
    controllers: RwLock<Vec<Arc<dyn Controller>>>,
}

impl Manager {
    pub fn new(id: ManagerId, driver: Arc<dyn HardwareDriver>) -> Self {
        Self {
            id,
            driver,
            controllers: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// Create and initialize the controller for `hardware_name`.
    ///
    /// A no-op when the controller already exists.
    pub fn create_controller(&self, controller_id: ControllerId, hardware_name: &str) -> Result<()> {
        if controller_id != self.id.controller_id() {
            return Err(HalError::InvalidArgument(format!(
                "manager '{}' cannot create a '{}' controller",
                self.id, controller_id
            )));
        }

        let mut controllers = self.controllers.write();
        let exists = if self.id.is_keyed() {
            controllers.iter().any(|c| c.hardware_name() == hardware_name)
        } else {
            !controllers.is_empty()
        };
        if exists {
            tracing::debug!("[{}] controller '{}' already exists", self.id, hardware_name);
            return Ok(());
        }

        let controller = build_controller(controller_id, hardware_name, Arc::clone(&self.driver));
        controller.init()?;
        controllers.push(controller);
        tracing::debug!("[{}] created controller '{}'", self.id, hardware_name);
        Ok(())
    }

    /// Remove the controller for `hardware_name`, powering it down first.
    pub fn remove_controller(&self, hardware_name: &str) -> Option<Arc<dyn Controller>> {
        let mut controllers = self.controllers.write();
        let position = controllers
            .iter()
            .position(|c| c.hardware_name() == hardware_name)?;
        let controller = controllers.remove(position);
        if let Err(e) = controller.power_down() {
            tracing::warn!("[{}] power down of removed '{}' failed: {}", self.id, hardware_name, e);
        }
        Some(controller)
    }

    /// Controller of kind `controller_id`. Keyed managers need
    /// `hardware_name`; single managers ignore it.
    pub fn get_controller(
        &self,
        controller_id: ControllerId,
        hardware_name: Option<&str>,
    ) -> Option<Arc<dyn Controller>> {
        if controller_id != self.id.controller_id() {
            return None;
        }
        let controllers = self.controllers.read();
        if self.id.is_keyed() {
            let name = hardware_name?;
            controllers.iter().find(|c| c.hardware_name() == name).cloned()
        } else {
            controllers.first().cloned()
        }
    }

    pub fn controllers(&self) -> Vec<Arc<dyn Controller>> {
        self.controllers.read().clone()
    }

    /// Power up the controller the camera uses in this category.
    ///
    /// A keyed manager with no name for the camera has nothing to do.
    pub fn power_up(&self, hardware_name: Option<&str>) -> Result<()> {
        if self.id.is_keyed() && hardware_name.is_none() {
            return Ok(());
        }
        match self.get_controller(self.id.controller_id(), hardware_name) {
            Some(controller) => controller.power_up(),
            None => Err(HalError::NotFound(format!(
                "[{}] no controller for '{}'",
                self.id,
                hardware_name.unwrap_or("-")
            ))),
        }
    }

    pub fn power_down(&self, hardware_name: Option<&str>) -> Result<()> {
        if self.id.is_keyed() && hardware_name.is_none() {
            return Ok(());
        }
        match self.get_controller(self.id.controller_id(), hardware_name) {
            Some(controller) => controller.power_down(),
            None => Ok(()),
        }
    }

    pub fn any_powered(&self) -> bool {
        self.controllers.read().iter().any(|c| c.is_powered())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::{DriverOp, SimulatedDriver};

    #[test]
    fn test_keyed_manager_holds_one_controller_per_name() {
        let manager = Manager::new(ManagerId::Sensor, Arc::new(SimulatedDriver::new()));
        manager.create_controller(ControllerId::Sensor, "imx335").unwrap();
        manager.create_controller(ControllerId::Sensor, "imx600").unwrap();
        manager.create_controller(ControllerId::Sensor, "imx335").unwrap();
        assert_eq!(manager.controllers().len(), 2);

        assert!(manager.get_controller(ControllerId::Sensor, Some("imx600")).is_some());
        assert!(manager.get_controller(ControllerId::Sensor, None).is_none());
    }

    #[test]
    fn test_single_manager_ignores_name() {
        let manager = Manager::new(ManagerId::Vpss, Arc::new(SimulatedDriver::new()));
        manager.create_controller(ControllerId::Vpss, "vpss").unwrap();
        manager.create_controller(ControllerId::Vpss, "vpss_b").unwrap();
        assert_eq!(manager.controllers().len(), 1);
        assert!(manager.get_controller(ControllerId::Vpss, None).is_some());
        assert!(manager.get_controller(ControllerId::Vi, None).is_none());
    }

    #[test]
    fn test_wrong_controller_kind_rejected() {
        let manager = Manager::new(ManagerId::Isp, Arc::new(SimulatedDriver::new()));
        assert!(manager.create_controller(ControllerId::Flash, "flash0").is_err());
    }

    #[test]
    fn test_init_failure_does_not_register() {
        let sim = Arc::new(SimulatedDriver::new());
        sim.fail_on(DriverOp::Init, "isp");
        let manager = Manager::new(ManagerId::Isp, sim);
        assert!(manager.create_controller(ControllerId::Isp, "isp").is_err());
        assert!(manager.controllers().is_empty());
    }

    #[test]
    fn test_remove_controller_powers_down() {
        let sim = Arc::new(SimulatedDriver::new());
        let manager = Manager::new(ManagerId::Sensor, sim.clone());
        manager.create_controller(ControllerId::Sensor, "usb_cam").unwrap();
        manager.power_up(Some("usb_cam")).unwrap();
        assert!(manager.any_powered());

        assert!(manager.remove_controller("usb_cam").is_some());
        assert!(!manager.any_powered());
        assert_eq!(sim.call_count(DriverOp::PowerDown, "usb_cam"), 1);
    }
}
