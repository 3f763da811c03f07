// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Hardware route wiring between media blocks.

use std::sync::Arc;

use camhal::core::device::{DriverOp, HardwareVariant, RouteTable, StageKind};
use camhal::{DeviceManager, HalError, HardwareTable, SimulatedDriver};

fn device_manager(variant: HardwareVariant, routes: RouteTable) -> (Arc<SimulatedDriver>, DeviceManager) {
    let driver = Arc::new(SimulatedDriver::new());
    let dm = DeviceManager::new(
        variant.name(),
        driver.clone(),
        HardwareTable::builtin(variant),
        routes,
    );
    dm.init().unwrap();
    (driver, dm)
}

#[test]
fn test_vi_to_vpss_binds_and_starts_destination() {
    let (driver, dm) = device_manager(HardwareVariant::Mpi, RouteTable::mpi());
    dm.connect("vi#0", "out#0", "vpss#1", "in#2").unwrap();

    let bindings = driver.bindings();
    assert_eq!(bindings.len(), 1);
    let (src, dst) = &bindings[0];
    assert_eq!((src.kind, src.device, src.channel), (StageKind::Vi, 0, 0));
    assert_eq!((dst.kind, dst.device, dst.channel), (StageKind::Vpss, 1, 2));
    assert_eq!(driver.call_count(DriverOp::Start, "vpss"), 1);

    dm.connect("vi#0", "out#0", "vpss#1", "in#2").unwrap();
    assert_eq!(driver.call_count(DriverOp::Start, "vpss"), 1);

    dm.unconnect("vi#0", "out#0", "vpss#1", "in#2").unwrap();
    assert_eq!(driver.call_count(DriverOp::Unbind, "vi#0:0"), 1);
}

#[test]
fn test_vpss_to_vo_skips_unbind() {
    let (driver, dm) = device_manager(HardwareVariant::Mpi, RouteTable::mpi());
    dm.connect("vpss#0", "out#1", "vo#0", "in#0").unwrap();
    assert_eq!(driver.bindings().len(), 1);

    dm.unconnect("vpss#0", "out#1", "vo#0", "in#0").unwrap();
    assert_eq!(driver.call_count(DriverOp::Unbind, "vpss#0:1"), 0);
}

#[test]
fn test_non_media_names_need_no_wiring() {
    let (driver, dm) = device_manager(HardwareVariant::Mpi, RouteTable::mpi());
    dm.connect("tuner", "out0", "vpss#0", "in#0").unwrap();
    dm.connect("vpss#0", "out#0", "encoder_tap", "in0").unwrap();
    dm.unconnect("tuner", "out0", "vpss#0", "in#0").unwrap();
    assert!(driver.bindings().is_empty());
    assert_eq!(driver.call_count(DriverOp::Start, "vpss"), 0);
}

#[test]
fn test_unrouted_pair_is_accepted() {
    let (driver, dm) = device_manager(HardwareVariant::Mpi, RouteTable::mpi());
    dm.connect("venc#0", "out#0", "vpss#0", "in#0").unwrap();
    assert!(driver.bindings().is_empty());
}

#[test]
fn test_display_cannot_be_route_source() {
    let (driver, dm) = device_manager(HardwareVariant::Mpi, RouteTable::mpi());
    assert!(matches!(
        dm.connect("vo#0", "out#0", "venc#0", "in#0"),
        Err(HalError::InvalidArgument(_))
    ));
    assert!(dm.connect("vo#0", "out#4", "vi#0", "in#0").is_err());
    assert!(dm.unconnect("vo#0", "out#0", "venc#0", "in#0").is_err());
    assert!(driver.bindings().is_empty());
}

#[test]
fn test_bind_failure_propagates() {
    let (driver, dm) = device_manager(HardwareVariant::Mpi, RouteTable::mpi());
    driver.fail_on(DriverOp::Bind, "vi#0:0");
    assert!(dm.connect("vi#0", "out#0", "vpss#0", "in#0").is_err());
    assert!(driver.bindings().is_empty());
}

#[test]
fn test_v4l2_has_no_hardware_routes() {
    let (driver, dm) = device_manager(HardwareVariant::V4l2, RouteTable::empty());
    dm.connect("vi#0", "out#0", "vpss#0", "in#0").unwrap();
    dm.unconnect("vi#0", "out#0", "vpss#0", "in#0").unwrap();
    assert!(driver.bindings().is_empty());
    assert_eq!(driver.call_count(DriverOp::Bind, "vi#0:0"), 0);
}

#[test]
fn test_routed_pair_without_destination_controller_fails() {
    let driver = Arc::new(SimulatedDriver::new());
    let table = HardwareTable::from_yaml_str(
        r#"
- { camera: 1, manager: sensor, controller: sensor, hardware: imx335 }
- { camera: 1, manager: vi, controller: vi, hardware: vi }
"#,
    )
    .unwrap();
    let dm = DeviceManager::new("mpi", driver.clone(), table, RouteTable::mpi());
    dm.init().unwrap();

    assert!(matches!(
        dm.connect("vi#0", "out#0", "vpss#0", "in#0"),
        Err(HalError::NotFound(_))
    ));
    assert_eq!(driver.call_count(DriverOp::Bind, "vi#0:0"), 0);
}
