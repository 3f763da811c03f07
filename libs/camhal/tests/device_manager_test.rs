// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Device manager behaviour through the backend registry.

use std::sync::Arc;

use camhal::core::device::{
    DeviceStatus, DriverOp, FlashController, IspController, SensorController, StreamController,
};
use camhal::{
    CameraId, Controller, ControllerId, DeviceManagerRegistry, FlashMode, HalError, HardwareConfiguration,
    HardwareTable, ManagerId, SimulatedDriver,
};
use parking_lot::Mutex;

fn registry() -> (Arc<SimulatedDriver>, DeviceManagerRegistry) {
    let driver = Arc::new(SimulatedDriver::new());
    let registry = DeviceManagerRegistry::with_builtin_backends(driver.clone());
    (driver, registry)
}

#[test]
fn test_registry_caches_initialized_instances() {
    let (driver, registry) = registry();
    assert_eq!(registry.backends(), vec!["mpi".to_string(), "v4l2".to_string()]);
    assert!(registry.get("mpi").is_none());

    let first = registry.get_or_create("mpi").unwrap();
    let second = registry.get_or_create("mpi").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.is_initialized());
    assert_eq!(driver.call_count(DriverOp::Init, "imx335"), 1);

    assert!(matches!(registry.get_or_create("dshow"), Err(HalError::NotFound(_))));
}

#[test]
fn test_failed_init_is_not_cached() {
    let (driver, registry) = registry();
    driver.fail_on(DriverOp::Init, "venc");
    assert!(registry.get_or_create("mpi").is_err());
    assert!(registry.get("mpi").is_none());

    driver.clear_failures();
    assert!(registry.get_or_create("mpi").unwrap().is_initialized());
}

#[test]
fn test_controllers_resolve_to_concrete_kinds() {
    let (_driver, registry) = registry();
    let dm = registry.get_or_create("mpi").unwrap();

    let sensor = dm
        .get_controller(ManagerId::Sensor, ControllerId::Sensor, Some(CameraId(1)))
        .unwrap();
    assert!(sensor.into_any().downcast::<SensorController>().is_ok());

    let isp = dm.get_controller(ManagerId::Isp, ControllerId::Isp, None).unwrap();
    assert!(isp.into_any().downcast::<IspController>().is_ok());

    let flash = dm
        .get_controller(ManagerId::Flash, ControllerId::Flash, Some(CameraId(1)))
        .unwrap();
    assert!(flash.into_any().downcast::<FlashController>().is_ok());

    for (manager, controller) in [
        (ManagerId::Vi, ControllerId::Vi),
        (ManagerId::Vpss, ControllerId::Vpss),
        (ManagerId::Venc, ControllerId::Venc),
        (ManagerId::Vo, ControllerId::Vo),
    ] {
        let stream = dm.get_controller(manager, controller, None).unwrap();
        assert!(stream.into_any().downcast::<StreamController>().is_ok(), "{}", manager);
    }

    assert!(dm.get_controller(ManagerId::Vi, ControllerId::Isp, None).is_none());
}

#[test]
fn test_power_up_is_idempotent_per_controller() {
    let (driver, registry) = registry();
    let dm = registry.get_or_create("mpi").unwrap();

    dm.power_up(CameraId(1)).unwrap();
    dm.power_up(CameraId(1)).unwrap();
    dm.power_up(CameraId(2)).unwrap();

    assert_eq!(driver.call_count(DriverOp::StartSystem, "system"), 1);
    assert_eq!(driver.call_count(DriverOp::PowerUp, "imx335"), 1);
    assert_eq!(driver.call_count(DriverOp::PowerUp, "imx600"), 1);
    assert_eq!(driver.call_count(DriverOp::PowerUp, "vpss"), 1);
    assert!(driver.is_system_running());
}

#[test]
fn test_power_down_continues_past_errors() {
    let (driver, registry) = registry();
    let dm = registry.get_or_create("mpi").unwrap();
    dm.power_up(CameraId(1)).unwrap();

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let statuses_clone = Arc::clone(&statuses);
    dm.set_device_status_callback(Arc::new(move |camera, status| {
        statuses_clone.lock().push((camera, status));
    }));

    driver.fail_on(DriverOp::PowerDown, "isp");
    assert!(dm.power_down(CameraId(1)).is_err());
    assert_eq!(driver.call_count(DriverOp::PowerDown, "imx335"), 1);
    assert_eq!(driver.call_count(DriverOp::PowerDown, "venc"), 1);
    assert_eq!(*statuses.lock(), vec![(CameraId(1), DeviceStatus::Error)]);
}

#[test]
fn test_flashlight_requires_powered_flash() {
    let (driver, registry) = registry();
    let dm = registry.get_or_create("mpi").unwrap();
    assert!(dm.set_flashlight(FlashMode::Torch, true).is_err());

    dm.power_up(CameraId(1)).unwrap();
    dm.set_flashlight(FlashMode::Single, true).unwrap();
    assert_eq!(driver.flashlight("flash0"), Some((FlashMode::Single, true)));
}

#[test]
fn test_ability_metadata_follows_subscribed_tags() {
    use camhal::core::frames::{tags, MetaValue};

    let (driver, registry) = registry();
    let mut ability = camhal::CameraMetadata::new();
    ability.set(tags::SENSOR_EXPOSURE_TIME, MetaValue::I64(vec![33_000]));
    ability.set(tags::SENSOR_SENSITIVITY, MetaValue::I32(vec![100]));
    driver.set_ability_metadata("imx335", ability);

    let dm = registry.get_or_create("mpi").unwrap();
    dm.set_ability_meta_tags(CameraId(1), &[tags::SENSOR_EXPOSURE_TIME]).unwrap();
    let meta = dm.get_ability_metadata(CameraId(1)).unwrap();
    assert!(meta.contains(tags::SENSOR_EXPOSURE_TIME));
    assert!(!meta.contains(tags::SENSOR_SENSITIVITY));
}

#[test]
fn test_hotplug_round_trip_on_v4l2() {
    let (_driver, registry) = registry();
    let dm = registry.get_or_create("v4l2").unwrap();
    assert_eq!(dm.get_camera_ids(), vec![CameraId(1)]);

    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = Arc::clone(&events);
    dm.set_hotplug_callback(Arc::new(move |_meta, added, camera| {
        events_clone.lock().push((camera, added));
    }));

    dm.hotplug_add(HardwareConfiguration::new(
        CameraId(3),
        ManagerId::Sensor,
        ControllerId::Sensor,
        "usb_cam3",
    ))
    .unwrap();
    dm.power_up(CameraId(3)).unwrap();
    assert!(dm.get_sensor(CameraId(3)).unwrap().is_powered());

    dm.hotplug_remove(CameraId(3)).unwrap();
    assert!(dm.get_sensor(CameraId(3)).is_none());
    assert!(dm.power_up(CameraId(3)).is_err());
    assert_eq!(*events.lock(), vec![(CameraId(3), true), (CameraId(3), false)]);
}

#[test]
fn test_custom_table_backend() {
    let driver = Arc::new(SimulatedDriver::new());
    let registry = DeviceManagerRegistry::new();
    let table = HardwareTable::from_yaml_str(
        r#"
- { camera: 7, manager: sensor, controller: sensor, hardware: ov5640 }
- { camera: 7, manager: vi, controller: vi, hardware: vi }
"#,
    )
    .unwrap();
    registry.register_table(
        "bench",
        driver.clone(),
        table,
        camhal::core::device::RouteTable::empty(),
    );

    let dm = registry.get_or_create("bench").unwrap();
    assert_eq!(dm.get_camera_ids(), vec![CameraId(7)]);
    assert_eq!(dm.get_sensor(CameraId(7)).unwrap().sensor_name(), "ov5640");
    assert!(dm.get_manager(ManagerId::Vpss).is_none());
}
